//! Handlers for `/alerts` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/alerts` | Optional `status` filter |
//! | `POST` | `/alerts/check` | Runs both scans; optional `threshold_hours` |
//! | `GET`  | `/alerts/stats` | Optional `window_hours`, default 24 |
//! | `POST` | `/alerts/:id/acknowledge` | Body: `{"by":"..."}` |
//! | `POST` | `/alerts/:id/resolve` | Body: `{"by":"...","notes":"..."}` |

use axum::{
  Json,
  extract::{Path, Query, State},
};
use muster_core::{
  alert::{Alert, AlertStatus},
  store::CampusStore,
};
use muster_engine::alerting::{AlertStatistics, DEFAULT_INACTIVITY_THRESHOLD_HOURS};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{AppState, error::ApiError};

/// Default statistics window, in hours.
const DEFAULT_STATS_WINDOW_HOURS: u32 = 24;

// ─── List ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub status: Option<AlertStatus>,
}

/// `GET /alerts[?status=active|acknowledged|resolved]`
pub async fn list<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<Alert>>, ApiError>
where
  S: CampusStore + 'static,
{
  let alerts = state
    .store
    .list_alerts(params.status)
    .await
    .map_err(|e| ApiError::Store(Box::new(e)))?;
  Ok(Json(alerts))
}

// ─── Check ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct CheckParams {
  pub threshold_hours: Option<u32>,
}

/// What one on-demand scan produced.
#[derive(Debug, Serialize)]
pub struct CheckOutcome {
  pub inactive:            Vec<Alert>,
  pub suspicious_patterns: Vec<Alert>,
}

/// `POST /alerts/check[?threshold_hours=12]` — runs the inactivity and
/// suspicious-pattern scans back to back.
pub async fn check<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<CheckParams>,
) -> Result<Json<CheckOutcome>, ApiError>
where
  S: CampusStore + 'static,
{
  let threshold = params
    .threshold_hours
    .unwrap_or(DEFAULT_INACTIVITY_THRESHOLD_HOURS);

  let inactive = state.alerting.check_inactive_entities(threshold).await?;
  let suspicious_patterns = state.alerting.check_anomalies().await?;

  Ok(Json(CheckOutcome { inactive, suspicious_patterns }))
}

// ─── Statistics ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct StatsParams {
  pub window_hours: Option<u32>,
}

/// `GET /alerts/stats[?window_hours=24]`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<StatsParams>,
) -> Result<Json<AlertStatistics>, ApiError>
where
  S: CampusStore + 'static,
{
  let window = params.window_hours.unwrap_or(DEFAULT_STATS_WINDOW_HOURS);
  let statistics = state.alerting.statistics(window).await?;
  Ok(Json(statistics))
}

// ─── Lifecycle ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AcknowledgeBody {
  pub by: String,
}

/// `POST /alerts/:id/acknowledge`
pub async fn acknowledge<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<AcknowledgeBody>,
) -> Result<Json<Alert>, ApiError>
where
  S: CampusStore + 'static,
{
  let alert = state.alerting.acknowledge(id, &body.by).await?;
  Ok(Json(alert))
}

#[derive(Debug, Deserialize)]
pub struct ResolveBody {
  pub by:    String,
  pub notes: Option<String>,
}

/// `POST /alerts/:id/resolve`
pub async fn resolve_one<S>(
  State(state): State<AppState<S>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ResolveBody>,
) -> Result<Json<Alert>, ApiError>
where
  S: CampusStore + 'static,
{
  let alert = state.alerting.resolve(id, &body.by, body.notes).await?;
  Ok(Json(alert))
}
