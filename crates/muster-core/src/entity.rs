//! Entity — the canonical subject record unifying identifiers across feeds.
//!
//! An entity is created on first sighting or explicit registration and is
//! never hard-deleted: merged-away duplicates are flagged `is_active = false`
//! and retained for audit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::alert::AlertKind;

/// The kind of subject an entity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
  Student,
  Staff,
  Asset,
  Device,
}

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// The sparse identifier bundle attached to an entity, and also the input
/// shape for resolution queries.
///
/// None of these fields is guaranteed globally unique by construction —
/// resolution is a best-effort matching problem, not a key lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Identifiers {
  pub student_id:    Option<String>,
  pub staff_id:      Option<String>,
  pub email:         Option<String>,
  pub card_id:       Option<String>,
  pub device_hash:   Option<String>,
  pub face_id:       Option<String>,
  /// Full display name; only used for fuzzy matching, never exact lookup.
  pub name:          Option<String>,
  /// Alternative spellings and former names, fuzzy-only like `name`.
  #[serde(default)]
  pub name_variants: Vec<String>,
}

impl Identifiers {
  /// The six exact-lookup fields as `(field name, value)` pairs, in
  /// declaration order, skipping absent and empty values.
  pub fn lookup_pairs(&self) -> Vec<(&'static str, &str)> {
    [
      ("student_id", &self.student_id),
      ("staff_id", &self.staff_id),
      ("email", &self.email),
      ("card_id", &self.card_id),
      ("device_hash", &self.device_hash),
      ("face_id", &self.face_id),
    ]
    .into_iter()
    .filter_map(|(field, value)| {
      value
        .as_deref()
        .filter(|v| !v.is_empty())
        .map(|v| (field, v))
    })
    .collect()
  }

  pub fn has_lookup_fields(&self) -> bool { !self.lookup_pairs().is_empty() }

  /// Copy every lookup field that is present on `other` and absent (or
  /// empty) here. Existing values always win; `name_variants` are adopted
  /// only when this bundle has none.
  pub fn fill_missing_from(&mut self, other: &Identifiers) {
    fn fill(slot: &mut Option<String>, value: &Option<String>) {
      let empty = slot.as_deref().is_none_or(str::is_empty);
      if empty && value.as_deref().is_some_and(|v| !v.is_empty()) {
        *slot = value.clone();
      }
    }

    fill(&mut self.student_id, &other.student_id);
    fill(&mut self.staff_id, &other.staff_id);
    fill(&mut self.email, &other.email);
    fill(&mut self.card_id, &other.card_id);
    fill(&mut self.device_hash, &other.device_hash);
    fill(&mut self.face_id, &other.face_id);
    fill(&mut self.name, &other.name);

    if self.name_variants.is_empty() && !other.name_variants.is_empty() {
      self.name_variants = other.name_variants.clone();
    }
  }
}

// ─── Profile ─────────────────────────────────────────────────────────────────

/// Descriptive attributes; `full_name` feeds the fuzzy matcher.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
  pub full_name:      Option<String>,
  pub department:     Option<String>,
  pub role:           Option<String>,
  pub face_embedding: Option<Vec<f32>>,
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// One provenance link recording that a source-system record was resolved
/// onto this entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceLink {
  pub source_id:   String,
  pub source_type: String,
  /// Match certainty in [0, 1]; a heuristic weight, not a probability.
  pub confidence:  f64,
  pub timestamp:   DateTime<Utc>,
}

// ─── Last seen ───────────────────────────────────────────────────────────────

/// Denormalised pointer to the most recent observation of the entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastSeen {
  pub timestamp: DateTime<Utc>,
  pub location:  Option<String>,
  pub source:    Option<String>,
  pub activity:  Option<String>,
}

// ─── Alert flag ──────────────────────────────────────────────────────────────

/// The alerting engine's flag on the entity itself. Resolving an alert
/// clears only `has_alert`; the other fields keep their last-written values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertFlag {
  pub has_alert:       bool,
  pub alert_type:      Option<AlertKind>,
  pub alert_message:   Option<String>,
  pub alert_timestamp: Option<DateTime<Utc>>,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// The canonical subject record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
  pub entity_id:        Uuid,
  pub created_at:       DateTime<Utc>,
  pub kind:             EntityKind,
  pub identifiers:      Identifiers,
  pub profile:          Profile,
  /// Provenance links, in resolution order.
  pub resolved_sources: Vec<SourceLink>,
  pub last_seen:        Option<LastSeen>,
  /// Soft-delete flag; false for merged-away duplicates.
  pub is_active:        bool,
  pub alert_status:     AlertFlag,
}

impl Entity {
  /// Human-facing label for alert titles: the profile name, else the first
  /// present lookup identifier, else the UUID.
  pub fn display_label(&self) -> String {
    if let Some(name) = self.profile.full_name.as_deref()
      && !name.is_empty()
    {
      return name.to_owned();
    }
    if let Some((_, value)) = self.identifiers.lookup_pairs().first() {
      return (*value).to_owned();
    }
    self.entity_id.to_string()
  }
}

// ─── NewEntity ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::CampusStore::add_entity`].
/// `entity_id` and `created_at` are always assigned by the store.
#[derive(Debug, Clone)]
pub struct NewEntity {
  pub kind:        EntityKind,
  pub identifiers: Identifiers,
  pub profile:     Profile,
}

impl NewEntity {
  /// Convenience constructor with empty identifiers and profile.
  pub fn new(kind: EntityKind) -> Self {
    Self {
      kind,
      identifiers: Identifiers::default(),
      profile: Profile::default(),
    }
  }
}
