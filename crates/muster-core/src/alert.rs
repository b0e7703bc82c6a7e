//! Alert records — derived, engine-owned signals requiring operator review.
//!
//! Invariant: at most one `active` alert per (entity, kind) pair. The store
//! enforces this atomically via
//! [`crate::store::CampusStore::create_alert_if_absent`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What condition the alert signals.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
  Inactive,
  Anomaly,
  UnauthorizedAccess,
  Missing,
  SuspiciousPattern,
}

impl AlertKind {
  /// The discriminant string stored in the `alert_type` column.
  pub fn discriminant(&self) -> &'static str {
    match self {
      Self::Inactive => "inactive",
      Self::Anomaly => "anomaly",
      Self::UnauthorizedAccess => "unauthorized_access",
      Self::Missing => "missing",
      Self::SuspiciousPattern => "suspicious_pattern",
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
  Low,
  Medium,
  High,
  Critical,
}

/// Operator-driven lifecycle. `active → acknowledged → resolved`, with
/// `active → resolved` allowed directly; no transition is blocked by the
/// current status. `resolved` is terminal in practice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertStatus {
  Active,
  Acknowledged,
  Resolved,
}

// ─── Details ─────────────────────────────────────────────────────────────────

/// Free-form evidence attached at creation; which fields are populated
/// depends on the alert kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertDetails {
  pub last_seen_timestamp:       Option<DateTime<Utc>>,
  pub last_seen_location:        Option<String>,
  pub hours_since_last_activity: Option<f64>,
  #[serde(default)]
  pub related_activities:        Vec<String>,
  /// For suspicious-pattern alerts: distinct locations / 5, not capped —
  /// values above 1.0 are expected.
  pub anomaly_score:             Option<f64>,
}

// ─── Alert ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
  pub alert_id:         Uuid,
  pub entity_id:        Uuid,
  pub kind:             AlertKind,
  pub severity:         Severity,
  pub title:            String,
  pub message:          String,
  pub details:          AlertDetails,
  pub status:           AlertStatus,
  pub acknowledged_by:  Option<String>,
  pub acknowledged_at:  Option<DateTime<Utc>>,
  pub resolved_by:      Option<String>,
  pub resolved_at:      Option<DateTime<Utc>>,
  pub resolution_notes: Option<String>,
  pub triggered_at:     DateTime<Utc>,
}

// ─── NewAlert ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::CampusStore::create_alert_if_absent`].
/// `alert_id` and `triggered_at` are assigned by the store; status starts
/// `active`.
#[derive(Debug, Clone)]
pub struct NewAlert {
  pub entity_id: Uuid,
  pub kind:      AlertKind,
  pub severity:  Severity,
  pub title:     String,
  pub message:   String,
  pub details:   AlertDetails,
}
