//! Handlers for `/predictions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET` | `/predictions/:entity_id/state` | Optional `at` (RFC 3339), default now |
//! | `GET` | `/predictions/:entity_id/next-location` | |
//! | `GET` | `/predictions/:entity_id/anomalies` | Optional `window_hours`, default 24 |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use muster_core::store::CampusStore;
use muster_engine::predict::{AnomalyReport, NextLocationPrediction, StatePrediction};
use serde::Deserialize;
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Default anomaly-detection window, in hours.
const DEFAULT_ANOMALY_WINDOW_HOURS: u32 = 24;

// ─── State ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct StateParams {
  /// The instant to predict for. Defaults to now.
  pub at: Option<DateTime<Utc>>,
}

/// `GET /predictions/:entity_id/state[?at=<rfc3339>]`
pub async fn state<S>(
  State(state): State<AppState<S>>,
  Path(entity_id): Path<Uuid>,
  Query(params): Query<StateParams>,
) -> Result<Json<StatePrediction>, ApiError>
where
  S: CampusStore + 'static,
{
  let at = params.at.unwrap_or_else(Utc::now);
  let prediction = state.predictive.predict_state(entity_id, at).await?;
  Ok(Json(prediction))
}

// ─── Next location ───────────────────────────────────────────────────────────

/// `GET /predictions/:entity_id/next-location`
pub async fn next_location<S>(
  State(state): State<AppState<S>>,
  Path(entity_id): Path<Uuid>,
) -> Result<Json<NextLocationPrediction>, ApiError>
where
  S: CampusStore + 'static,
{
  let prediction = state.predictive.predict_next_location(entity_id).await?;
  Ok(Json(prediction))
}

// ─── Anomalies ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct AnomalyParams {
  pub window_hours: Option<u32>,
}

/// `GET /predictions/:entity_id/anomalies[?window_hours=24]`
pub async fn anomalies<S>(
  State(state): State<AppState<S>>,
  Path(entity_id): Path<Uuid>,
  Query(params): Query<AnomalyParams>,
) -> Result<Json<AnomalyReport>, ApiError>
where
  S: CampusStore + 'static,
{
  let window = params.window_hours.unwrap_or(DEFAULT_ANOMALY_WINDOW_HOURS);
  let report = state.predictive.detect_anomalies(entity_id, window).await?;
  Ok(Json(report))
}
