//! Activity records — one timestamped observation of an entity per record.
//!
//! Records are immutable once written. The engines only read them; the one
//! exception is the predicted-activity placeholder the timeline collaborator
//! synthesizes to fill gaps, which is returned to callers and never
//! persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The feed an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
  Swipe,
  Wifi,
  Library,
  Booking,
  Cctv,
  Helpdesk,
  Other,
}

impl ActivityKind {
  /// The discriminant string stored in the `activity_type` column.
  /// Must match the `rename_all = "lowercase"` serde tags above.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Swipe => "swipe",
      Self::Wifi => "wifi",
      Self::Library => "library",
      Self::Booking => "booking",
      Self::Cctv => "cctv",
      Self::Helpdesk => "helpdesk",
      Self::Other => "other",
    }
  }
}

// ─── Location ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Coordinates {
  pub lat: f64,
  pub lng: f64,
}

/// Where an observation happened. Every field is optional; feeds differ in
/// what they can report.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Location {
  pub location_id:   Option<String>,
  pub location_name: Option<String>,
  pub building:      Option<String>,
  pub floor:         Option<String>,
  pub coordinates:   Option<Coordinates>,
}

impl Location {
  /// Grouping key used by the prediction engines: id, else name, else
  /// `"unknown"`.
  pub fn key(&self) -> &str {
    self
      .location_id
      .as_deref()
      .or(self.location_name.as_deref())
      .unwrap_or("unknown")
  }

  /// Human-facing label: name, else id, else `"unknown"`.
  pub fn label(&self) -> &str {
    self
      .location_name
      .as_deref()
      .or(self.location_id.as_deref())
      .unwrap_or("unknown")
  }
}

// ─── Source payloads ─────────────────────────────────────────────────────────

/// What happened to a library item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LibraryAction {
  Checkout,
  Return,
}

/// Badge reader event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SwipePayload {
  pub card_id:        Option<String>,
  pub access_granted: Option<bool>,
}

/// Access-point association.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WifiPayload {
  pub device_hash:     Option<String>,
  pub ap_id:           Option<String>,
  pub signal_strength: Option<f64>,
}

/// Circulation-desk event.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryPayload {
  pub book_id:    Option<String>,
  pub book_title: Option<String>,
  pub action:     Option<LibraryAction>,
}

/// Room reservation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingPayload {
  pub room_id:          Option<String>,
  pub purpose:          Option<String>,
  pub duration_minutes: Option<u32>,
}

/// Camera sighting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CctvPayload {
  pub camera_id: Option<String>,
  pub frame_id:  Option<String>,
  pub image_url: Option<String>,
}

/// Support-desk interaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HelpdeskPayload {
  pub ticket_id: Option<String>,
  pub notes:     Option<String>,
  pub category:  Option<String>,
}

/// The typed, feed-specific payload of a record. The variant must agree
/// with the record's [`ActivityKind`]; that agreement is validated at the
/// store boundary, not inside the engines. `other` records carry no
/// structured payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum SourcePayload {
  Swipe(SwipePayload),
  Wifi(WifiPayload),
  Library(LibraryPayload),
  Booking(BookingPayload),
  Cctv(CctvPayload),
  Helpdesk(HelpdeskPayload),
}

impl SourcePayload {
  /// The activity kind this payload belongs to.
  pub fn kind(&self) -> ActivityKind {
    match self {
      Self::Swipe(_) => ActivityKind::Swipe,
      Self::Wifi(_) => ActivityKind::Wifi,
      Self::Library(_) => ActivityKind::Library,
      Self::Booking(_) => ActivityKind::Booking,
      Self::Cctv(_) => ActivityKind::Cctv,
      Self::Helpdesk(_) => ActivityKind::Helpdesk,
    }
  }
}

// ─── Prediction metadata ─────────────────────────────────────────────────────

/// Attached only to synthesized placeholder records (`is_predicted = true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionMetadata {
  pub method:     String,
  pub evidence:   Vec<String>,
  pub confidence: f64,
}

// ─── ActivityRecord ──────────────────────────────────────────────────────────

/// One observed (or synthesized) event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityRecord {
  pub activity_id:         Uuid,
  pub entity_id:           Uuid,
  pub kind:                ActivityKind,
  pub timestamp:           DateTime<Utc>,
  pub location:            Location,
  pub source_data:         Option<SourcePayload>,
  /// Data-quality weight in [0, 1]; defaults to 1.0.
  pub confidence:          f64,
  pub data_source:         String,
  pub source_record_id:    Option<String>,
  pub is_predicted:        bool,
  pub prediction_metadata: Option<PredictionMetadata>,
}

// ─── NewActivity ─────────────────────────────────────────────────────────────

/// Input to [`crate::store::CampusStore::record_activity`].
/// `activity_id` is assigned by the store; `timestamp` is the observation
/// time and comes from the feed.
#[derive(Debug, Clone)]
pub struct NewActivity {
  pub entity_id:        Uuid,
  pub kind:             ActivityKind,
  pub timestamp:        DateTime<Utc>,
  pub location:         Location,
  pub source_data:      Option<SourcePayload>,
  pub confidence:       f64,
  pub data_source:      String,
  pub source_record_id: Option<String>,
}

impl NewActivity {
  /// Convenience constructor with an empty location, no payload, and full
  /// confidence.
  pub fn new(entity_id: Uuid, kind: ActivityKind, timestamp: DateTime<Utc>) -> Self {
    Self {
      entity_id,
      kind,
      timestamp,
      location: Location::default(),
      source_data: None,
      confidence: 1.0,
      data_source: String::new(),
      source_record_id: None,
    }
  }

  /// Boundary validation: the payload variant must agree with `kind`
  /// (`other` takes none), and `confidence` must lie in [0, 1].
  pub fn validate(&self) -> Result<()> {
    if !(0.0..=1.0).contains(&self.confidence) {
      return Err(Error::InvalidInput(format!(
        "activity confidence {} outside [0, 1]",
        self.confidence
      )));
    }
    match &self.source_data {
      None => Ok(()),
      Some(_) if self.kind == ActivityKind::Other => Err(Error::InvalidInput(
        "'other' activities take no structured payload".to_owned(),
      )),
      Some(payload) if payload.kind() != self.kind => Err(Error::InvalidInput(format!(
        "{} payload on {} activity",
        payload.kind().discriminant(),
        self.kind.discriminant()
      ))),
      Some(_) => Ok(()),
    }
  }
}
