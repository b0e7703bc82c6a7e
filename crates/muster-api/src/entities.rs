//! Handlers for `/entities` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entities` | Optional `query`, `kind`, `limit` |
//! | `GET`  | `/entities/:id` | Entity plus activity count; 404 if not found |
//! | `POST` | `/entities/resolve` | Body: an identifier bundle |
//! | `POST` | `/entities/merge` | Body: `{"primary_id":..,"secondary_id":..}` |
//! | `POST` | `/entities/:id/links` | Body: [`LinkBody`] |
//! | `GET`  | `/entities/:id/timeline` | Optional `start`, `end`, `predict` |

use axum::{
  Json,
  extract::{Path, Query, State},
  response::{IntoResponse, Response},
};
use chrono::{DateTime, Duration, Utc};
use muster_core::{
  entity::{Entity, EntityKind, Identifiers},
  store::{CampusStore, EntitySearch},
};
use muster_engine::resolve::ResolutionResult;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

// ─── Search ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct SearchParams {
  /// Substring filter over identifiers and profile name.
  pub query: Option<String>,
  pub kind:  Option<EntityKind>,
  pub limit: Option<usize>,
}

/// `GET /entities[?query=...][&kind=...][&limit=...]`
pub async fn search<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<SearchParams>,
) -> Result<Json<Vec<Entity>>, ApiError>
where
  S: CampusStore + 'static,
{
  let query = EntitySearch {
    text:  params.query,
    kind:  params.kind,
    limit: params.limit,
  };

  let entities = state
    .store
    .search_entities(&query)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(entities))
}

// ─── Get one ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct EntityWithCount {
  #[serde(flatten)]
  pub entity:         Entity,
  pub activity_count: u64,
}

/// `GET /entities/:id`
pub async fn get_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<EntityWithCount>, ApiError>
where
  S: CampusStore + 'static,
{
  let entity = state
    .store
    .get_entity(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?
    .ok_or_else(|| ApiError::NotFound(format!("entity {id} not found")))?;

  let activity_count = state
    .store
    .count_activities(id)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;

  Ok(Json(EntityWithCount { entity, activity_count }))
}

// ─── Resolve ─────────────────────────────────────────────────────────────────

/// `POST /entities/resolve` — body is an identifier bundle, e.g.
/// `{"card_id":"C100"}` or `{"name":"Jon Smith"}`.
pub async fn resolve<S>(
  State(state): State<AppState<S>>,
  Json(bundle): Json<Identifiers>,
) -> Result<Json<ResolutionResult>, ApiError>
where
  S: CampusStore + 'static,
{
  let result = state.resolution.resolve(&bundle).await?;
  Ok(Json(result))
}

// ─── Merge ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MergeBody {
  pub primary_id:   Uuid,
  pub secondary_id: Uuid,
}

/// `POST /entities/merge`
pub async fn merge<S>(
  State(state): State<AppState<S>>,
  Json(body): Json<MergeBody>,
) -> Result<Json<Entity>, ApiError>
where
  S: CampusStore + 'static,
{
  let merged = state
    .resolution
    .merge(body.primary_id, body.secondary_id)
    .await?;
  Ok(Json(merged))
}

// ─── Link ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct LinkBody {
  pub source_id:   String,
  pub source_type: String,
  /// Defaults to 1.0.
  pub confidence:  Option<f64>,
}

/// `POST /entities/:id/links`
pub async fn link<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<LinkBody>,
) -> Result<Json<Entity>, ApiError>
where
  S: CampusStore + 'static,
{
  let entity = state
    .resolution
    .link_records(
      id,
      body.source_id,
      body.source_type,
      body.confidence.unwrap_or(1.0),
    )
    .await?;
  Ok(Json(entity))
}

// ─── Timeline ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct TimelineParams {
  /// Defaults to `end` minus 24 hours.
  pub start:   Option<DateTime<Utc>>,
  /// Defaults to now.
  pub end:     Option<DateTime<Utc>>,
  /// If `true`, fill gaps with predictions. Default `false`.
  #[serde(default)]
  pub predict: bool,
}

/// `GET /entities/:id/timeline[?start=...][&end=...][&predict=true]`
pub async fn timeline<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Query(params): Query<TimelineParams>,
) -> Result<Response, ApiError>
where
  S: CampusStore + 'static,
{
  let end = params.end.unwrap_or_else(Utc::now);
  let start = params.start.unwrap_or(end - Duration::hours(24));

  if params.predict {
    let result = state
      .timeline
      .timeline_with_predictions(id, start, end, &state.predictive)
      .await?;
    Ok(Json(result).into_response())
  } else {
    let result = state.timeline.timeline(id, start, end).await?;
    Ok(Json(result).into_response())
  }
}
