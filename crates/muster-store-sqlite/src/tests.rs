//! Integration tests for `SqliteStore` against an in-memory database.

use chrono::{Duration, Utc};
use muster_core::{
  activity::{ActivityKind, Location, NewActivity, SourcePayload, SwipePayload, WifiPayload},
  alert::{AlertDetails, AlertKind, AlertStatus, NewAlert, Severity},
  entity::{EntityKind, NewEntity},
  store::{CampusStore, EntitySearch},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn student(card_id: &str, full_name: &str) -> NewEntity {
  let mut input = NewEntity::new(EntityKind::Student);
  input.identifiers.card_id = Some(card_id.into());
  input.profile.full_name = Some(full_name.into());
  input
}

fn swipe_at(entity_id: Uuid, location_id: &str, hours_ago: i64) -> NewActivity {
  let mut input = NewActivity::new(
    entity_id,
    ActivityKind::Swipe,
    Utc::now() - Duration::hours(hours_ago),
  );
  input.location = Location {
    location_id: Some(location_id.into()),
    location_name: Some(format!("Room {location_id}")),
    ..Location::default()
  };
  input.data_source = "door-controller".into();
  input
}

fn inactive_alert(entity_id: Uuid) -> NewAlert {
  NewAlert {
    entity_id,
    kind: AlertKind::Inactive,
    severity: Severity::Medium,
    title: "No Activity Detected".into(),
    message: "No activity recorded for 13.0 hours".into(),
    details: AlertDetails::default(),
  }
}

// ─── Entities ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn add_and_get_entity() {
  let s = store().await;

  let entity = s.add_entity(student("C100", "Alice Liddell")).await.unwrap();
  assert_eq!(entity.kind, EntityKind::Student);
  assert!(entity.is_active);

  let fetched = s.get_entity(entity.entity_id).await.unwrap().unwrap();
  assert_eq!(fetched.entity_id, entity.entity_id);
  assert_eq!(fetched.identifiers.card_id.as_deref(), Some("C100"));
  assert_eq!(fetched.profile.full_name.as_deref(), Some("Alice Liddell"));
  assert!(!fetched.alert_status.has_alert);
}

#[tokio::test]
async fn get_entity_missing_returns_none() {
  let s = store().await;
  assert!(s.get_entity(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_by_identifiers_matches_any_supplied_field() {
  let s = store().await;

  let by_card = s.add_entity(student("C1", "Ada")).await.unwrap();
  let mut with_email = NewEntity::new(EntityKind::Staff);
  with_email.identifiers.email = Some("bob@campus.edu".into());
  let by_email = s.add_entity(with_email).await.unwrap();
  s.add_entity(student("C3", "Carol")).await.unwrap();

  let bundle = muster_core::entity::Identifiers {
    card_id: Some("C1".into()),
    email: Some("bob@campus.edu".into()),
    ..Default::default()
  };

  let found = s.find_by_identifiers(&bundle).await.unwrap();
  assert_eq!(found.len(), 2);

  // Deterministic order: entity_id ascending.
  let mut expected = vec![by_card.entity_id, by_email.entity_id];
  expected.sort();
  let got: Vec<Uuid> = found.iter().map(|e| e.entity_id).collect();
  assert_eq!(got, expected);
}

#[tokio::test]
async fn find_by_identifiers_empty_bundle_returns_nothing() {
  let s = store().await;
  s.add_entity(student("C1", "Ada")).await.unwrap();

  let bundle = muster_core::entity::Identifiers::default();
  assert!(s.find_by_identifiers(&bundle).await.unwrap().is_empty());
}

#[tokio::test]
async fn find_named_entities_requires_full_name() {
  let s = store().await;

  s.add_entity(student("C1", "Ada Lovelace")).await.unwrap();
  s.add_entity(NewEntity::new(EntityKind::Device)).await.unwrap();

  let named = s.find_named_entities().await.unwrap();
  assert_eq!(named.len(), 1);
  assert_eq!(named[0].profile.full_name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn find_active_entities_excludes_soft_deleted() {
  let s = store().await;

  let keep = s.add_entity(student("C1", "Ada")).await.unwrap();
  let mut gone = s.add_entity(student("C2", "Bea")).await.unwrap();
  gone.is_active = false;
  s.update_entity(&gone).await.unwrap();

  let active = s.find_active_entities().await.unwrap();
  assert_eq!(active.len(), 1);
  assert_eq!(active[0].entity_id, keep.entity_id);
}

#[tokio::test]
async fn search_entities_by_text_and_kind() {
  let s = store().await;

  s.add_entity(student("C100", "Alice Liddell")).await.unwrap();
  let mut staff = NewEntity::new(EntityKind::Staff);
  staff.profile.full_name = Some("Alice Munro".into());
  s.add_entity(staff).await.unwrap();

  let by_text = s
    .search_entities(&EntitySearch {
      text: Some("Alice".into()),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(by_text.len(), 2);

  let staff_only = s
    .search_entities(&EntitySearch {
      text: Some("Alice".into()),
      kind: Some(EntityKind::Staff),
      ..Default::default()
    })
    .await
    .unwrap();
  assert_eq!(staff_only.len(), 1);
  assert_eq!(staff_only[0].kind, EntityKind::Staff);
}

#[tokio::test]
async fn update_entity_roundtrips_structured_fields() {
  let s = store().await;

  let mut entity = s.add_entity(student("C1", "Ada")).await.unwrap();
  entity.identifiers.email = Some("ada@campus.edu".into());
  entity.identifiers.name_variants = vec!["A. Lovelace".into()];
  entity.last_seen = Some(muster_core::entity::LastSeen {
    timestamp: Utc::now(),
    location:  Some("Library".into()),
    source:    Some("wifi".into()),
    activity:  Some("wifi".into()),
  });
  entity.alert_status.has_alert = true;
  entity.alert_status.alert_type = Some(AlertKind::Inactive);
  s.update_entity(&entity).await.unwrap();

  let fetched = s.get_entity(entity.entity_id).await.unwrap().unwrap();
  assert_eq!(fetched.identifiers.email.as_deref(), Some("ada@campus.edu"));
  assert_eq!(fetched.identifiers.name_variants, &["A. Lovelace"]);
  assert_eq!(
    fetched.last_seen.as_ref().unwrap().location.as_deref(),
    Some("Library")
  );
  assert!(fetched.alert_status.has_alert);
  assert_eq!(fetched.alert_status.alert_type, Some(AlertKind::Inactive));
}

// ─── Activities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn record_activity_and_fetch_latest() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  s.record_activity(swipe_at(entity.entity_id, "LIB-1", 5))
    .await
    .unwrap();
  let newest = s
    .record_activity(swipe_at(entity.entity_id, "LAB-2", 1))
    .await
    .unwrap();

  let latest = s.latest_activity(entity.entity_id).await.unwrap().unwrap();
  assert_eq!(latest.activity_id, newest.activity_id);
  assert_eq!(latest.location.location_id.as_deref(), Some("LAB-2"));
  assert!(!latest.is_predicted);
}

#[tokio::test]
async fn record_activity_payload_roundtrip() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let mut input = swipe_at(entity.entity_id, "LIB-1", 1);
  input.source_data = Some(SourcePayload::Swipe(SwipePayload {
    card_id:        Some("C1".into()),
    access_granted: Some(true),
  }));
  s.record_activity(input).await.unwrap();

  let latest = s.latest_activity(entity.entity_id).await.unwrap().unwrap();
  assert!(matches!(
    latest.source_data,
    Some(SourcePayload::Swipe(SwipePayload {
      access_granted: Some(true),
      ..
    }))
  ));
}

#[tokio::test]
async fn record_activity_rejects_mismatched_payload() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let mut input = swipe_at(entity.entity_id, "LIB-1", 1);
  input.source_data = Some(SourcePayload::Wifi(WifiPayload::default()));

  let err = s.record_activity(input).await.unwrap_err();
  assert!(matches!(
    err,
    Error::Core(muster_core::Error::InvalidInput(_))
  ));
}

#[tokio::test]
async fn activities_before_is_newest_first_and_limited() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  for hours_ago in [10, 8, 6, 4, 2] {
    s.record_activity(swipe_at(entity.entity_id, "LIB-1", hours_ago))
      .await
      .unwrap();
  }

  let cutoff = Utc::now() - Duration::hours(3);
  let records = s
    .activities_before(entity.entity_id, cutoff, 3)
    .await
    .unwrap();

  assert_eq!(records.len(), 3);
  assert!(records.windows(2).all(|w| w[0].timestamp >= w[1].timestamp));
  assert!(records.iter().all(|r| r.timestamp < cutoff));
}

#[tokio::test]
async fn activities_in_range_is_oldest_first() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  for hours_ago in [30, 20, 10, 1] {
    s.record_activity(swipe_at(entity.entity_id, "LIB-1", hours_ago))
      .await
      .unwrap();
  }

  let records = s
    .activities_in_range(
      entity.entity_id,
      Utc::now() - Duration::hours(24),
      Utc::now(),
    )
    .await
    .unwrap();

  assert_eq!(records.len(), 3);
  assert!(records.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
}

#[tokio::test]
async fn activities_with_location_skips_unlocated_records() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  s.record_activity(swipe_at(entity.entity_id, "LIB-1", 3))
    .await
    .unwrap();
  // A wifi sighting with no resolvable location.
  let mut unlocated = NewActivity::new(
    entity.entity_id,
    ActivityKind::Wifi,
    Utc::now() - Duration::hours(2),
  );
  unlocated.data_source = "wifi-controller".into();
  s.record_activity(unlocated).await.unwrap();

  let located = s
    .activities_with_location(entity.entity_id, 50)
    .await
    .unwrap();
  assert_eq!(located.len(), 1);
  assert_eq!(located[0].location.location_id.as_deref(), Some("LIB-1"));
}

#[tokio::test]
async fn count_activities_counts_only_that_entity() {
  let s = store().await;
  let a = s.add_entity(student("C1", "Ada")).await.unwrap();
  let b = s.add_entity(student("C2", "Bea")).await.unwrap();

  s.record_activity(swipe_at(a.entity_id, "LIB-1", 2)).await.unwrap();
  s.record_activity(swipe_at(a.entity_id, "LIB-1", 1)).await.unwrap();
  s.record_activity(swipe_at(b.entity_id, "LIB-1", 1)).await.unwrap();

  assert_eq!(s.count_activities(a.entity_id).await.unwrap(), 2);
  assert_eq!(s.count_activities(b.entity_id).await.unwrap(), 1);
}

// ─── Alerts ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn conditional_insert_suppresses_duplicate_active_alert() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let first = s
    .create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap();
  assert!(first.is_some());

  let second = s
    .create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap();
  assert!(second.is_none());

  let active = s.list_alerts(Some(AlertStatus::Active)).await.unwrap();
  assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn conditional_insert_allows_new_alert_after_resolution() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let mut alert = s
    .create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap()
    .unwrap();

  alert.status = AlertStatus::Resolved;
  alert.resolved_by = Some("ops".into());
  alert.resolved_at = Some(Utc::now());
  s.update_alert(&alert).await.unwrap();

  let reopened = s
    .create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap();
  assert!(reopened.is_some());
}

#[tokio::test]
async fn different_alert_kinds_do_not_conflict() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  s.create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap()
    .unwrap();

  let mut suspicious = inactive_alert(entity.entity_id);
  suspicious.kind = AlertKind::SuspiciousPattern;
  suspicious.details.anomaly_score = Some(1.2);
  let created = s.create_alert_if_absent(suspicious).await.unwrap();
  assert!(created.is_some());
}

#[tokio::test]
async fn get_alert_missing_returns_none() {
  let s = store().await;
  assert!(s.get_alert(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn find_active_alert_scored_only_ignores_unscored() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let mut unscored = inactive_alert(entity.entity_id);
  unscored.kind = AlertKind::SuspiciousPattern;
  s.create_alert_if_absent(unscored).await.unwrap().unwrap();

  let any = s
    .find_active_alert(entity.entity_id, AlertKind::SuspiciousPattern, false)
    .await
    .unwrap();
  assert!(any.is_some());

  let scored = s
    .find_active_alert(entity.entity_id, AlertKind::SuspiciousPattern, true)
    .await
    .unwrap();
  assert!(scored.is_none());
}

#[tokio::test]
async fn update_alert_roundtrips_lifecycle_fields() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  let mut alert = s
    .create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap()
    .unwrap();

  alert.status = AlertStatus::Acknowledged;
  alert.acknowledged_by = Some("ops".into());
  alert.acknowledged_at = Some(Utc::now());
  s.update_alert(&alert).await.unwrap();

  let fetched = s.get_alert(alert.alert_id).await.unwrap().unwrap();
  assert_eq!(fetched.status, AlertStatus::Acknowledged);
  assert_eq!(fetched.acknowledged_by.as_deref(), Some("ops"));
  assert!(fetched.acknowledged_at.is_some());
}

#[tokio::test]
async fn alerts_triggered_since_filters_by_window() {
  let s = store().await;
  let entity = s.add_entity(student("C1", "Ada")).await.unwrap();

  s.create_alert_if_absent(inactive_alert(entity.entity_id))
    .await
    .unwrap()
    .unwrap();

  let recent = s
    .alerts_triggered_since(Utc::now() - Duration::hours(1))
    .await
    .unwrap();
  assert_eq!(recent.len(), 1);

  let future_only = s
    .alerts_triggered_since(Utc::now() + Duration::hours(1))
    .await
    .unwrap();
  assert!(future_only.is_empty());
}
