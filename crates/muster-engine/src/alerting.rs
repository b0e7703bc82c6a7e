//! Alerting — inactivity and suspicious-pattern scans, alert lifecycle, and
//! statistics.
//!
//! Scans iterate every active entity; a failure on one entity is logged and
//! the rest of the scan proceeds. Deduplication rests on the store's atomic
//! conditional insert, so concurrent scans cannot double-create an alert;
//! the per-entity pre-checks only save work.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use muster_core::{
  Error, Result,
  activity::ActivityRecord,
  alert::{Alert, AlertDetails, AlertKind, AlertStatus, NewAlert, Severity},
  entity::{AlertFlag, Entity},
  store::CampusStore,
};
use serde::Serialize;
use uuid::Uuid;

/// Default inactivity threshold when the caller does not supply one.
pub const DEFAULT_INACTIVITY_THRESHOLD_HOURS: u32 = 12;

/// Inactivity beyond this many hours escalates to high severity.
const HIGH_SEVERITY_HOURS: f64 = 24.0;
/// Window scanned for suspicious movement.
const MOVEMENT_WINDOW_HOURS: i64 = 24;
/// Distinct locations within one hour beyond which movement is flagged.
const RAPID_LOCATION_LIMIT: usize = 5;

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct AlertStatistics {
  pub total_alerts:      u64,
  pub active_alerts:     u64,
  /// Computed as total minus active, which counts acknowledged alerts as
  /// resolved. Kept that way for compatibility with existing consumers.
  pub resolved_alerts:   u64,
  pub by_type:           BTreeMap<AlertKind, u64>,
  pub by_severity:       BTreeMap<Severity, u64>,
  pub time_window_hours: u32,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct AlertEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for AlertEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store) }
  }
}

impl<S> AlertEngine<S>
where
  S: CampusStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  // ── Scans ─────────────────────────────────────────────────────────────────

  /// Raise an `inactive` alert for every active entity whose latest
  /// activity is older than `threshold_hours` (or that has none at all).
  /// Returns the newly created alerts.
  pub async fn check_inactive_entities(&self, threshold_hours: u32) -> Result<Vec<Alert>> {
    let now = Utc::now();
    let cutoff = now - Duration::hours(i64::from(threshold_hours));

    let entities = self
      .store
      .find_active_entities()
      .await
      .map_err(Error::store)?;

    let mut new_alerts = Vec::new();
    for entity in entities {
      match self.check_one_inactive(&entity, cutoff, now).await {
        Ok(Some(alert)) => new_alerts.push(alert),
        Ok(None) => {}
        // One entity failing must not abort the scan.
        Err(err) => {
          tracing::warn!(entity_id = %entity.entity_id, error = %err, "inactivity check failed");
        }
      }
    }

    Ok(new_alerts)
  }

  async fn check_one_inactive(
    &self,
    entity: &Entity,
    cutoff: DateTime<Utc>,
    now: DateTime<Utc>,
  ) -> Result<Option<Alert>> {
    let existing = self
      .store
      .find_active_alert(entity.entity_id, AlertKind::Inactive, false)
      .await
      .map_err(Error::store)?;
    if existing.is_some() {
      return Ok(None);
    }

    let last_activity = self
      .store
      .latest_activity(entity.entity_id)
      .await
      .map_err(Error::store)?;

    let stale = match &last_activity {
      None => true,
      Some(rec) => rec.timestamp < cutoff,
    };
    if !stale {
      return Ok(None);
    }

    let hours_since = last_activity
      .as_ref()
      .map(|rec| (now - rec.timestamp).num_seconds() as f64 / 3600.0);

    let severity = if hours_since.is_some_and(|h| h > HIGH_SEVERITY_HOURS) {
      Severity::High
    } else {
      Severity::Medium
    };

    let message = match hours_since {
      Some(h) => format!("No activity recorded for {h:.1} hours"),
      None => "No activity recorded in system".to_owned(),
    };

    let details = AlertDetails {
      last_seen_timestamp: last_activity.as_ref().map(|rec| rec.timestamp),
      last_seen_location: last_activity.as_ref().and_then(|rec| {
        rec
          .location
          .location_name
          .clone()
          .or_else(|| rec.location.location_id.clone())
      }),
      hours_since_last_activity: hours_since,
      ..AlertDetails::default()
    };

    let created = self
      .store
      .create_alert_if_absent(NewAlert {
        entity_id: entity.entity_id,
        kind: AlertKind::Inactive,
        severity,
        title: format!("No Activity Detected - {}", entity.display_label()),
        message,
        details,
      })
      .await
      .map_err(Error::store)?;

    // None: a concurrent scan won the conditional insert; nothing to do.
    let Some(alert) = created else {
      return Ok(None);
    };

    let mut entity = entity.clone();
    entity.alert_status = AlertFlag {
      has_alert:       true,
      alert_type:      Some(AlertKind::Inactive),
      alert_message:   Some(alert.message.clone()),
      alert_timestamp: Some(now),
    };
    self.store.update_entity(&entity).await.map_err(Error::store)?;

    Ok(Some(alert))
  }

  /// Raise a `suspicious_pattern` alert for every active entity that moved
  /// through more than five distinct locations in the last hour. Returns
  /// the newly created alerts.
  pub async fn check_anomalies(&self) -> Result<Vec<Alert>> {
    let now = Utc::now();

    let entities = self
      .store
      .find_active_entities()
      .await
      .map_err(Error::store)?;

    let mut new_alerts = Vec::new();
    for entity in entities {
      match self.check_one_rapid_movement(&entity, now).await {
        Ok(Some(alert)) => new_alerts.push(alert),
        Ok(None) => {}
        Err(err) => {
          tracing::warn!(entity_id = %entity.entity_id, error = %err, "suspicious-pattern check failed");
        }
      }
    }

    Ok(new_alerts)
  }

  async fn check_one_rapid_movement(
    &self,
    entity: &Entity,
    now: DateTime<Utc>,
  ) -> Result<Option<Alert>> {
    let recent = self
      .store
      .activities_in_range(
        entity.entity_id,
        now - Duration::hours(MOVEMENT_WINDOW_HOURS),
        now,
      )
      .await
      .map_err(Error::store)?;
    if recent.is_empty() {
      return Ok(None);
    }

    let one_hour_ago = now - Duration::hours(1);
    let very_recent: Vec<&ActivityRecord> = recent
      .iter()
      .filter(|rec| rec.timestamp >= one_hour_ago)
      .collect();
    if very_recent.is_empty() {
      return Ok(None);
    }

    let mut unique_locations: Vec<&str> = Vec::new();
    for rec in &very_recent {
      if let Some(id) = rec.location.location_id.as_deref()
        && !id.is_empty()
        && !unique_locations.contains(&id)
      {
        unique_locations.push(id);
      }
    }
    if unique_locations.len() <= RAPID_LOCATION_LIMIT {
      return Ok(None);
    }

    // Only an active alert that carries a positive score suppresses a new
    // one; the conditional insert below is still the real guarantee.
    let existing = self
      .store
      .find_active_alert(entity.entity_id, AlertKind::SuspiciousPattern, true)
      .await
      .map_err(Error::store)?;
    if existing.is_some() {
      return Ok(None);
    }

    let related_activities: Vec<String> = very_recent
      .iter()
      .map(|rec| format!("{} at {}", rec.kind.discriminant(), rec.location.label()))
      .collect();

    let created = self
      .store
      .create_alert_if_absent(NewAlert {
        entity_id: entity.entity_id,
        kind: AlertKind::SuspiciousPattern,
        severity: Severity::Medium,
        title: format!("Unusual Activity Pattern - {}", entity.display_label()),
        message: format!(
          "Detected {} location changes in 1 hour",
          unique_locations.len()
        ),
        details: AlertDetails {
          anomaly_score: Some(
            unique_locations.len() as f64 / RAPID_LOCATION_LIMIT as f64,
          ),
          related_activities,
          ..AlertDetails::default()
        },
      })
      .await
      .map_err(Error::store)?;

    Ok(created)
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  /// Mark an alert acknowledged. Callable regardless of current status.
  pub async fn acknowledge(&self, alert_id: Uuid, acknowledged_by: &str) -> Result<Alert> {
    let mut alert = self
      .store
      .get_alert(alert_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AlertNotFound(alert_id))?;

    alert.status = AlertStatus::Acknowledged;
    alert.acknowledged_by = Some(acknowledged_by.to_owned());
    alert.acknowledged_at = Some(Utc::now());

    self.store.update_alert(&alert).await.map_err(Error::store)?;
    Ok(alert)
  }

  /// Mark an alert resolved and clear the owning entity's alert flag.
  /// Only the boolean is cleared; the flag's descriptive fields keep their
  /// last-written values.
  pub async fn resolve(
    &self,
    alert_id: Uuid,
    resolved_by: &str,
    resolution_notes: Option<String>,
  ) -> Result<Alert> {
    let mut alert = self
      .store
      .get_alert(alert_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::AlertNotFound(alert_id))?;

    alert.status = AlertStatus::Resolved;
    alert.resolved_by = Some(resolved_by.to_owned());
    alert.resolved_at = Some(Utc::now());
    alert.resolution_notes = resolution_notes;

    self.store.update_alert(&alert).await.map_err(Error::store)?;

    if let Some(mut entity) = self
      .store
      .get_entity(alert.entity_id)
      .await
      .map_err(Error::store)?
      && entity.alert_status.has_alert
    {
      entity.alert_status.has_alert = false;
      self.store.update_entity(&entity).await.map_err(Error::store)?;
    }

    Ok(alert)
  }

  // ── Statistics ────────────────────────────────────────────────────────────

  /// Counts over alerts triggered within the trailing window.
  pub async fn statistics(&self, time_window_hours: u32) -> Result<AlertStatistics> {
    if time_window_hours == 0 {
      return Err(Error::InvalidInput(
        "statistics window must be at least one hour".to_owned(),
      ));
    }

    let since = Utc::now() - Duration::hours(i64::from(time_window_hours));
    let alerts = self
      .store
      .alerts_triggered_since(since)
      .await
      .map_err(Error::store)?;

    let total_alerts = alerts.len() as u64;
    let active_alerts = alerts
      .iter()
      .filter(|a| a.status == AlertStatus::Active)
      .count() as u64;

    let mut by_type: BTreeMap<AlertKind, u64> = BTreeMap::new();
    let mut by_severity: BTreeMap<Severity, u64> = BTreeMap::new();
    for alert in &alerts {
      *by_type.entry(alert.kind).or_insert(0) += 1;
      *by_severity.entry(alert.severity).or_insert(0) += 1;
    }

    Ok(AlertStatistics {
      total_alerts,
      active_alerts,
      resolved_alerts: total_alerts - active_alerts,
      by_type,
      by_severity,
      time_window_hours,
    })
  }
}
