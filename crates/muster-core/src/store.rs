//! The `CampusStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `muster-store-sqlite`).
//! The engines (`muster-engine`) and the HTTP layer depend on this
//! abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  activity::{ActivityRecord, NewActivity},
  alert::{Alert, AlertKind, AlertStatus, NewAlert},
  entity::{Entity, EntityKind, Identifiers, NewEntity},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`CampusStore::search_entities`].
#[derive(Debug, Clone, Default)]
pub struct EntitySearch {
  /// Substring filter over the lookup identifiers and the profile name.
  pub text:  Option<String>,
  /// Restrict to entities of a specific kind.
  pub kind:  Option<EntityKind>,
  pub limit: Option<usize>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Muster storage backend.
///
/// Activity records are append-only: the store accepts and returns them but
/// never mutates one. Entities and alerts are mutable; each write is a
/// single-record operation with no multi-record transactions, so a failure
/// mid-scan leaves other records untouched.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait CampusStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Entities ──────────────────────────────────────────────────────────

  /// Create and persist a new entity. `entity_id` and `created_at` are
  /// assigned by the store.
  fn add_entity(
    &self,
    input: NewEntity,
  ) -> impl Future<Output = Result<Entity, Self::Error>> + Send + '_;

  /// Retrieve an entity by id. Returns `None` if not found.
  fn get_entity(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Entity>, Self::Error>> + Send + '_;

  /// Entities whose identifier fields equal any of the supplied values
  /// (logical OR over the six lookup fields), ordered by `entity_id`
  /// ascending so that "first match" is deterministic. Inactive entities
  /// are included; merged-away records stay matchable for audit.
  fn find_by_identifiers<'a>(
    &'a self,
    bundle: &'a Identifiers,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Every entity with a non-empty profile full name, for fuzzy matching.
  fn find_named_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Every entity with `is_active = true`.
  fn find_active_entities(
    &self,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + '_;

  /// Substring search over identifiers and profile name.
  fn search_entities<'a>(
    &'a self,
    query: &'a EntitySearch,
  ) -> impl Future<Output = Result<Vec<Entity>, Self::Error>> + Send + 'a;

  /// Persist the given entity state, replacing the stored record.
  fn update_entity<'a>(
    &'a self,
    entity: &'a Entity,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  // ── Activities — append-only ──────────────────────────────────────────

  /// Record one observation. The payload must agree with the activity
  /// kind (see [`NewActivity::validate`]); the store rejects mismatches.
  fn record_activity(
    &self,
    input: NewActivity,
  ) -> impl Future<Output = Result<ActivityRecord, Self::Error>> + Send + '_;

  /// The single most recent record for an entity.
  fn latest_activity(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<Option<ActivityRecord>, Self::Error>> + Send + '_;

  /// Up to `limit` records strictly before `before`, newest first.
  fn activities_before(
    &self,
    entity_id: Uuid,
    before: DateTime<Utc>,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ActivityRecord>, Self::Error>> + Send + '_;

  /// Records with `start <= timestamp <= end`, oldest first.
  fn activities_in_range(
    &self,
    entity_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<ActivityRecord>, Self::Error>> + Send + '_;

  /// Up to `limit` records carrying a non-null `location_id`, newest
  /// first. Feeds the transition table.
  fn activities_with_location(
    &self,
    entity_id: Uuid,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<ActivityRecord>, Self::Error>> + Send + '_;

  fn count_activities(
    &self,
    entity_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Alerts ────────────────────────────────────────────────────────────

  /// Atomic conditional insert: create the alert unless an `active` alert
  /// of the same (entity, kind) already exists, in which case `None` is
  /// returned and nothing is written. This is the dedup guarantee — it
  /// must hold under concurrent invocations.
  fn create_alert_if_absent(
    &self,
    input: NewAlert,
  ) -> impl Future<Output = Result<Option<Alert>, Self::Error>> + Send + '_;

  /// Retrieve an alert by id. Returns `None` if not found.
  fn get_alert(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Alert>, Self::Error>> + Send + '_;

  /// The active alert of the given kind for an entity, if any. With
  /// `scored_only`, only alerts carrying a positive anomaly score match.
  fn find_active_alert(
    &self,
    entity_id: Uuid,
    kind: AlertKind,
    scored_only: bool,
  ) -> impl Future<Output = Result<Option<Alert>, Self::Error>> + Send + '_;

  /// All alerts, optionally filtered by status, newest first.
  fn list_alerts(
    &self,
    status: Option<AlertStatus>,
  ) -> impl Future<Output = Result<Vec<Alert>, Self::Error>> + Send + '_;

  /// Alerts with `triggered_at >= since`, for statistics.
  fn alerts_triggered_since(
    &self,
    since: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<Alert>, Self::Error>> + Send + '_;

  /// Persist the given alert state, replacing the stored record.
  fn update_alert<'a>(
    &'a self,
    alert: &'a Alert,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}
