//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as fixed-precision RFC 3339 UTC strings, so
//! lexicographic comparison in SQL matches chronological order. Structured
//! sub-records (profile, location, payloads, alert details) are stored as
//! compact JSON. UUIDs are stored as hyphenated lowercase strings.

use chrono::{DateTime, SecondsFormat, Utc};
use muster_core::{
  activity::{ActivityKind, ActivityRecord, Location, SourcePayload},
  alert::{Alert, AlertDetails, AlertKind, AlertStatus, Severity},
  entity::{AlertFlag, Entity, EntityKind, Identifiers, LastSeen, Profile, SourceLink},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

/// Fixed microsecond precision keeps every stored timestamp the same width,
/// which is what makes `ORDER BY timestamp` and range predicates correct on
/// TEXT columns.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── EntityKind ──────────────────────────────────────────────────────────────

pub fn encode_entity_kind(k: EntityKind) -> &'static str {
  match k {
    EntityKind::Student => "student",
    EntityKind::Staff => "staff",
    EntityKind::Asset => "asset",
    EntityKind::Device => "device",
  }
}

pub fn decode_entity_kind(s: &str) -> Result<EntityKind> {
  match s {
    "student" => Ok(EntityKind::Student),
    "staff" => Ok(EntityKind::Staff),
    "asset" => Ok(EntityKind::Asset),
    "device" => Ok(EntityKind::Device),
    other => Err(Error::Decode(format!("unknown entity kind: {other:?}"))),
  }
}

// ─── ActivityKind ────────────────────────────────────────────────────────────

pub fn decode_activity_kind(s: &str) -> Result<ActivityKind> {
  match s {
    "swipe" => Ok(ActivityKind::Swipe),
    "wifi" => Ok(ActivityKind::Wifi),
    "library" => Ok(ActivityKind::Library),
    "booking" => Ok(ActivityKind::Booking),
    "cctv" => Ok(ActivityKind::Cctv),
    "helpdesk" => Ok(ActivityKind::Helpdesk),
    "other" => Ok(ActivityKind::Other),
    other => Err(Error::Decode(format!("unknown activity kind: {other:?}"))),
  }
}

// ─── AlertKind / Severity / AlertStatus ──────────────────────────────────────

pub fn decode_alert_kind(s: &str) -> Result<AlertKind> {
  match s {
    "inactive" => Ok(AlertKind::Inactive),
    "anomaly" => Ok(AlertKind::Anomaly),
    "unauthorized_access" => Ok(AlertKind::UnauthorizedAccess),
    "missing" => Ok(AlertKind::Missing),
    "suspicious_pattern" => Ok(AlertKind::SuspiciousPattern),
    other => Err(Error::Decode(format!("unknown alert kind: {other:?}"))),
  }
}

pub fn encode_severity(s: Severity) -> &'static str {
  match s {
    Severity::Low => "low",
    Severity::Medium => "medium",
    Severity::High => "high",
    Severity::Critical => "critical",
  }
}

pub fn decode_severity(s: &str) -> Result<Severity> {
  match s {
    "low" => Ok(Severity::Low),
    "medium" => Ok(Severity::Medium),
    "high" => Ok(Severity::High),
    "critical" => Ok(Severity::Critical),
    other => Err(Error::Decode(format!("unknown severity: {other:?}"))),
  }
}

pub fn encode_alert_status(s: AlertStatus) -> &'static str {
  match s {
    AlertStatus::Active => "active",
    AlertStatus::Acknowledged => "acknowledged",
    AlertStatus::Resolved => "resolved",
  }
}

pub fn decode_alert_status(s: &str) -> Result<AlertStatus> {
  match s {
    "active" => Ok(AlertStatus::Active),
    "acknowledged" => Ok(AlertStatus::Acknowledged),
    "resolved" => Ok(AlertStatus::Resolved),
    other => Err(Error::Decode(format!("unknown alert status: {other:?}"))),
  }
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: serde::Serialize>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: serde::de::DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

// ─── Entity rows ─────────────────────────────────────────────────────────────

/// Column list shared by every entity SELECT; order matches
/// [`RawEntity::from_row`].
pub const ENTITY_COLUMNS: &str = "entity_id, created_at, entity_type, \
   student_id, staff_id, email, card_id, device_hash, face_id, \
   name, name_variants, full_name, profile, resolved_sources, last_seen, \
   is_active, alert_status";

/// Raw strings read directly from an `entities` row.
pub struct RawEntity {
  pub entity_id:        String,
  pub created_at:       String,
  pub entity_type:      String,
  pub student_id:       Option<String>,
  pub staff_id:         Option<String>,
  pub email:            Option<String>,
  pub card_id:          Option<String>,
  pub device_hash:      Option<String>,
  pub face_id:          Option<String>,
  pub name:             Option<String>,
  pub name_variants:    String,
  pub profile:          String,
  pub resolved_sources: String,
  pub last_seen:        Option<String>,
  pub is_active:        bool,
  pub alert_status:     String,
}

impl RawEntity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entity_id:        row.get(0)?,
      created_at:       row.get(1)?,
      entity_type:      row.get(2)?,
      student_id:       row.get(3)?,
      staff_id:         row.get(4)?,
      email:            row.get(5)?,
      card_id:          row.get(6)?,
      device_hash:      row.get(7)?,
      face_id:          row.get(8)?,
      name:             row.get(9)?,
      name_variants:    row.get(10)?,
      // full_name (11) is a mirror of profile.full_name; the profile JSON
      // is authoritative on read.
      profile:          row.get(12)?,
      resolved_sources: row.get(13)?,
      last_seen:        row.get(14)?,
      is_active:        row.get(15)?,
      alert_status:     row.get(16)?,
    })
  }

  pub fn into_entity(self) -> Result<Entity> {
    let identifiers = Identifiers {
      student_id:    self.student_id,
      staff_id:      self.staff_id,
      email:         self.email,
      card_id:       self.card_id,
      device_hash:   self.device_hash,
      face_id:       self.face_id,
      name:          self.name,
      name_variants: decode_json::<Vec<String>>(&self.name_variants)?,
    };

    let profile: Profile = decode_json(&self.profile)?;
    let resolved_sources: Vec<SourceLink> = decode_json(&self.resolved_sources)?;
    let last_seen: Option<LastSeen> =
      self.last_seen.as_deref().map(decode_json).transpose()?;
    let alert_status: AlertFlag = decode_json(&self.alert_status)?;

    Ok(Entity {
      entity_id: decode_uuid(&self.entity_id)?,
      created_at: decode_dt(&self.created_at)?,
      kind: decode_entity_kind(&self.entity_type)?,
      identifiers,
      profile,
      resolved_sources,
      last_seen,
      is_active: self.is_active,
      alert_status,
    })
  }
}

// ─── Activity rows ───────────────────────────────────────────────────────────

/// Column list shared by every activity SELECT; order matches
/// [`RawActivity::from_row`]. The `location_id` mirror column is a filter
/// aid only; the location JSON is authoritative on read.
pub const ACTIVITY_COLUMNS: &str = "activity_id, entity_id, activity_type, \
   timestamp, location, source_data, confidence, data_source, source_record_id";

/// Raw strings read directly from an `activities` row.
pub struct RawActivity {
  pub activity_id:      String,
  pub entity_id:        String,
  pub activity_type:    String,
  pub timestamp:        String,
  pub location:         String,
  pub source_data:      Option<String>,
  pub confidence:       f64,
  pub data_source:      String,
  pub source_record_id: Option<String>,
}

impl RawActivity {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      activity_id:      row.get(0)?,
      entity_id:        row.get(1)?,
      activity_type:    row.get(2)?,
      timestamp:        row.get(3)?,
      location:         row.get(4)?,
      source_data:      row.get(5)?,
      confidence:       row.get(6)?,
      data_source:      row.get(7)?,
      source_record_id: row.get(8)?,
    })
  }

  pub fn into_record(self) -> Result<ActivityRecord> {
    let location: Location = decode_json(&self.location)?;
    let source_data: Option<SourcePayload> =
      self.source_data.as_deref().map(decode_json).transpose()?;

    Ok(ActivityRecord {
      activity_id: decode_uuid(&self.activity_id)?,
      entity_id: decode_uuid(&self.entity_id)?,
      kind: decode_activity_kind(&self.activity_type)?,
      timestamp: decode_dt(&self.timestamp)?,
      location,
      source_data,
      confidence: self.confidence,
      data_source: self.data_source,
      source_record_id: self.source_record_id,
      // Stored rows are observations by definition; placeholders never
      // reach the database.
      is_predicted: false,
      prediction_metadata: None,
    })
  }
}

// ─── Alert rows ──────────────────────────────────────────────────────────────

/// Column list shared by every alert SELECT; order matches
/// [`RawAlert::from_row`]. The `anomaly_score` mirror column exists for the
/// scored dedup predicate; the details JSON is authoritative on read.
pub const ALERT_COLUMNS: &str = "alert_id, entity_id, alert_type, severity, \
   title, message, details, status, acknowledged_by, acknowledged_at, \
   resolved_by, resolved_at, resolution_notes, triggered_at";

/// Raw strings read directly from an `alerts` row.
pub struct RawAlert {
  pub alert_id:         String,
  pub entity_id:        String,
  pub alert_type:       String,
  pub severity:         String,
  pub title:            String,
  pub message:          String,
  pub details:          String,
  pub status:           String,
  pub acknowledged_by:  Option<String>,
  pub acknowledged_at:  Option<String>,
  pub resolved_by:      Option<String>,
  pub resolved_at:      Option<String>,
  pub resolution_notes: Option<String>,
  pub triggered_at:     String,
}

impl RawAlert {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      alert_id:         row.get(0)?,
      entity_id:        row.get(1)?,
      alert_type:       row.get(2)?,
      severity:         row.get(3)?,
      title:            row.get(4)?,
      message:          row.get(5)?,
      details:          row.get(6)?,
      status:           row.get(7)?,
      acknowledged_by:  row.get(8)?,
      acknowledged_at:  row.get(9)?,
      resolved_by:      row.get(10)?,
      resolved_at:      row.get(11)?,
      resolution_notes: row.get(12)?,
      triggered_at:     row.get(13)?,
    })
  }

  pub fn into_alert(self) -> Result<Alert> {
    let details: AlertDetails = decode_json(&self.details)?;

    Ok(Alert {
      alert_id: decode_uuid(&self.alert_id)?,
      entity_id: decode_uuid(&self.entity_id)?,
      kind: decode_alert_kind(&self.alert_type)?,
      severity: decode_severity(&self.severity)?,
      title: self.title,
      message: self.message,
      details,
      status: decode_alert_status(&self.status)?,
      acknowledged_by: self.acknowledged_by,
      acknowledged_at: self.acknowledged_at.as_deref().map(decode_dt).transpose()?,
      resolved_by: self.resolved_by,
      resolved_at: self.resolved_at.as_deref().map(decode_dt).transpose()?,
      resolution_notes: self.resolution_notes,
      triggered_at: decode_dt(&self.triggered_at)?,
    })
  }
}
