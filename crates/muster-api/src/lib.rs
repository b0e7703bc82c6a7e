//! JSON REST API for Muster.
//!
//! Exposes an axum [`Router`] backed by any
//! [`muster_core::store::CampusStore`], with the inference engines
//! constructed once and shared through the router state. Auth, TLS, and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", muster_api::api_router(store.clone()))
//! ```

pub mod alerts;
pub mod entities;
pub mod error;
pub mod predictions;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post},
};
use muster_core::store::CampusStore;
use muster_engine::{
  alerting::AlertEngine, predict::PredictiveEngine, resolve::ResolutionEngine,
  timeline::TimelineEngine,
};
use serde::Deserialize;

pub use error::ApiError;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all axum handlers: the store plus one
/// instance of each engine over it.
pub struct AppState<S> {
  pub store:      Arc<S>,
  pub resolution: ResolutionEngine<S>,
  pub predictive: PredictiveEngine<S>,
  pub alerting:   AlertEngine<S>,
  pub timeline:   TimelineEngine<S>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:      Arc::clone(&self.store),
      resolution: self.resolution.clone(),
      predictive: self.predictive.clone(),
      alerting:   self.alerting.clone(),
      timeline:   self.timeline.clone(),
    }
  }
}

impl<S> AppState<S>
where
  S: CampusStore,
{
  pub fn new(store: Arc<S>) -> Self {
    Self {
      resolution: ResolutionEngine::new(Arc::clone(&store)),
      predictive: PredictiveEngine::new(Arc::clone(&store)),
      alerting:   AlertEngine::new(Arc::clone(&store)),
      timeline:   TimelineEngine::new(Arc::clone(&store)),
      store,
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: CampusStore + 'static,
{
  let state = AppState::new(store);

  Router::new()
    // Entities
    .route("/entities", get(entities::search::<S>))
    .route("/entities/resolve", post(entities::resolve::<S>))
    .route("/entities/merge", post(entities::merge::<S>))
    .route("/entities/{id}", get(entities::get_one::<S>))
    .route("/entities/{id}/links", post(entities::link::<S>))
    .route("/entities/{id}/timeline", get(entities::timeline::<S>))
    // Predictions
    .route("/predictions/{entity_id}/state", get(predictions::state::<S>))
    .route(
      "/predictions/{entity_id}/next-location",
      get(predictions::next_location::<S>),
    )
    .route(
      "/predictions/{entity_id}/anomalies",
      get(predictions::anomalies::<S>),
    )
    // Alerts
    .route("/alerts", get(alerts::list::<S>))
    .route("/alerts/check", post(alerts::check::<S>))
    .route("/alerts/stats", get(alerts::stats::<S>))
    .route("/alerts/{id}/acknowledge", post(alerts::acknowledge::<S>))
    .route("/alerts/{id}/resolve", post(alerts::resolve_one::<S>))
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use chrono::{Duration, Utc};
  use muster_core::{
    activity::{ActivityKind, Location, NewActivity},
    entity::{EntityKind, NewEntity},
  };
  use muster_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  async fn test_store() -> Arc<SqliteStore> {
    Arc::new(SqliteStore::open_in_memory().await.unwrap())
  }

  async fn seed_student(store: &SqliteStore, card_id: &str, name: &str) -> Uuid {
    let mut input = NewEntity::new(EntityKind::Student);
    input.identifiers.card_id = Some(card_id.into());
    input.profile.full_name = Some(name.into());
    store.add_entity(input).await.unwrap().entity_id
  }

  async fn seed_swipe(store: &SqliteStore, entity_id: Uuid, hours_ago: i64) {
    let mut input = NewActivity::new(
      entity_id,
      ActivityKind::Swipe,
      Utc::now() - Duration::hours(hours_ago),
    );
    input.location = Location {
      location_id: Some("LIB-1".into()),
      location_name: Some("Main Library".into()),
      ..Location::default()
    };
    input.data_source = "door-controller".into();
    store.record_activity(input).await.unwrap();
  }

  async fn send(
    router: Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
  ) -> (StatusCode, serde_json::Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    let body = match body {
      Some(json) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(json.to_string())
      }
      None => Body::empty(),
    };
    let response = router.oneshot(builder.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
      .await
      .unwrap();
    let json = if bytes.is_empty() {
      serde_json::Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
  }

  #[tokio::test]
  async fn resolve_endpoint_returns_exact_match() {
    let store = test_store().await;
    seed_student(&store, "C100", "Alice Liddell").await;
    let router = api_router(Arc::clone(&store));

    let (status, json) = send(
      router,
      "POST",
      "/entities/resolve",
      Some(serde_json::json!({ "card_id": "C100" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["resolved"], true);
    assert_eq!(json["method"], "exact_match");
    assert_eq!(json["confidence"], 1.0);
    assert_eq!(json["entity"]["identifiers"]["card_id"], "C100");
  }

  #[tokio::test]
  async fn unknown_entity_returns_404() {
    let store = test_store().await;
    let router = api_router(Arc::clone(&store));

    let (status, json) =
      send(router, "GET", &format!("/entities/{}", Uuid::new_v4()), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(json["error"].as_str().unwrap().contains("not found"));
  }

  #[tokio::test]
  async fn entity_response_includes_activity_count() {
    let store = test_store().await;
    let entity_id = seed_student(&store, "C1", "Ada").await;
    seed_swipe(&store, entity_id, 2).await;
    seed_swipe(&store, entity_id, 1).await;
    let router = api_router(Arc::clone(&store));

    let (status, json) =
      send(router, "GET", &format!("/entities/{entity_id}"), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["activity_count"], 2);
  }

  #[tokio::test]
  async fn alert_check_and_lifecycle_roundtrip() {
    let store = test_store().await;
    let entity_id = seed_student(&store, "C1", "Ada Lovelace").await;
    seed_swipe(&store, entity_id, 13).await;

    // The scan raises one inactivity alert.
    let (status, json) = send(
      api_router(Arc::clone(&store)),
      "POST",
      "/alerts/check?threshold_hours=12",
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["inactive"].as_array().unwrap().len(), 1);
    assert!(json["suspicious_patterns"].as_array().unwrap().is_empty());
    let alert_id = json["inactive"][0]["alert_id"].as_str().unwrap().to_owned();

    // It shows up in the active listing.
    let (status, json) = send(
      api_router(Arc::clone(&store)),
      "GET",
      "/alerts?status=active",
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json.as_array().unwrap().len(), 1);

    // Acknowledge, then resolve.
    let (status, json) = send(
      api_router(Arc::clone(&store)),
      "POST",
      &format!("/alerts/{alert_id}/acknowledge"),
      Some(serde_json::json!({ "by": "front-desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "acknowledged");

    let (status, json) = send(
      api_router(Arc::clone(&store)),
      "POST",
      &format!("/alerts/{alert_id}/resolve"),
      Some(serde_json::json!({ "by": "ops", "notes": "found in library" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "resolved");

    // Resolution cleared the entity's flag.
    let entity = store.get_entity(entity_id).await.unwrap().unwrap();
    assert!(!entity.alert_status.has_alert);
  }

  #[tokio::test]
  async fn acknowledge_unknown_alert_returns_404() {
    let store = test_store().await;
    let router = api_router(Arc::clone(&store));

    let (status, _) = send(
      router,
      "POST",
      &format!("/alerts/{}/acknowledge", Uuid::new_v4()),
      Some(serde_json::json!({ "by": "ops" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
  }

  #[tokio::test]
  async fn merging_an_entity_into_itself_is_a_bad_request() {
    let store = test_store().await;
    let entity_id = seed_student(&store, "C1", "Ada").await;
    let router = api_router(Arc::clone(&store));

    let (status, _) = send(
      router,
      "POST",
      "/entities/merge",
      Some(serde_json::json!({
        "primary_id": entity_id,
        "secondary_id": entity_id,
      })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
  }

  #[tokio::test]
  async fn state_prediction_without_history_reports_insufficient_data() {
    let store = test_store().await;
    let entity_id = seed_student(&store, "C1", "Ada").await;
    let router = api_router(Arc::clone(&store));

    let (status, json) = send(
      router,
      "GET",
      &format!("/predictions/{entity_id}/state"),
      None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["method"], "insufficient_data");
    assert_eq!(json["confidence"], 0.0);
  }

  #[tokio::test]
  async fn timeline_endpoint_returns_buckets() {
    let store = test_store().await;
    let entity_id = seed_student(&store, "C1", "Ada").await;
    seed_swipe(&store, entity_id, 3).await;
    seed_swipe(&store, entity_id, 1).await;
    let router = api_router(Arc::clone(&store));

    let (status, json) = send(
      router,
      "GET",
      &format!("/entities/{entity_id}/timeline"),
      None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["total_activities"], 2);
    assert_eq!(json["by_hour"].as_array().unwrap().len(), 2);
  }
}
