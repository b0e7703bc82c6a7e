//! Timeline generation — windowed retrieval with hourly grouping, gap
//! detection, and gap-filling predictions.
//!
//! This module is a caller of [`PredictiveEngine`], never the other way
//! around. The placeholder records it synthesizes for gaps carry
//! `is_predicted = true` and are returned to the caller, never persisted.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};
use muster_core::{
  Error, Result,
  activity::{ActivityKind, ActivityRecord, PredictionMetadata},
  store::CampusStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::predict::{PredictiveEngine, StatePrediction};

/// Gaps longer than this many fractional hours get a midpoint prediction.
const PREDICTION_GAP_HOURS: f64 = 2.0;

// ─── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimeWindow {
  pub start: DateTime<Utc>,
  pub end:   DateTime<Utc>,
}

/// One hour of activity, keyed by the formatted hour it falls in.
#[derive(Debug, Clone, Serialize)]
pub struct HourBucket {
  /// `YYYY-MM-DD HH:00`.
  pub hour:           String,
  pub count:          usize,
  /// Distinct location labels, first-seen order.
  pub locations:      Vec<String>,
  /// Distinct activity kinds, first-seen order.
  pub activity_kinds: Vec<ActivityKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineStats {
  pub total_activities:     usize,
  pub by_kind:              BTreeMap<ActivityKind, u64>,
  pub by_location:          BTreeMap<String, u64>,
  pub confidence_average:   f64,
  pub predicted_activities: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct Timeline {
  pub entity_id:        Uuid,
  pub window:           TimeWindow,
  pub total_activities: usize,
  pub activities:       Vec<ActivityRecord>,
  pub by_hour:          Vec<HourBucket>,
  pub stats:            TimelineStats,
}

/// A stretch between two adjacent observations long enough to wonder about.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct TimelineGap {
  pub start:          DateTime<Utc>,
  pub end:            DateTime<Utc>,
  pub duration_hours: f64,
}

/// A gap together with the state predicted at its midpoint and the
/// placeholder record synthesized from that prediction.
#[derive(Debug, Clone, Serialize)]
pub struct GapPrediction {
  pub gap:         TimelineGap,
  pub timestamp:   DateTime<Utc>,
  pub prediction:  StatePrediction,
  pub placeholder: ActivityRecord,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimelineWithPredictions {
  #[serde(flatten)]
  pub timeline:    Timeline,
  pub gaps:        Vec<TimelineGap>,
  pub predictions: Vec<GapPrediction>,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct TimelineEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for TimelineEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store) }
  }
}

impl<S> TimelineEngine<S>
where
  S: CampusStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Activities in `[start, end]`, oldest first, with hourly grouping and
  /// aggregate stats.
  pub async fn timeline(
    &self,
    entity_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
  ) -> Result<Timeline> {
    if start > end {
      return Err(Error::InvalidInput("timeline start is after end".to_owned()));
    }

    let activities = self
      .store
      .activities_in_range(entity_id, start, end)
      .await
      .map_err(Error::store)?;

    let by_hour = group_by_hour(&activities);
    let stats = compute_stats(&activities);

    Ok(Timeline {
      entity_id,
      window: TimeWindow { start, end },
      total_activities: activities.len(),
      activities,
      by_hour,
      stats,
    })
  }

  /// The same timeline plus gaps and, per gap, a state prediction at the
  /// gap midpoint. A prediction failing for one gap is logged and skipped.
  pub async fn timeline_with_predictions(
    &self,
    entity_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    predictive: &PredictiveEngine<S>,
  ) -> Result<TimelineWithPredictions> {
    let timeline = self.timeline(entity_id, start, end).await?;

    let mut gaps = Vec::new();
    for pair in timeline.activities.windows(2) {
      let duration_hours =
        (pair[1].timestamp - pair[0].timestamp).num_seconds() as f64 / 3600.0;
      if duration_hours > PREDICTION_GAP_HOURS {
        gaps.push(TimelineGap {
          start: pair[0].timestamp,
          end: pair[1].timestamp,
          duration_hours,
        });
      }
    }

    let mut predictions = Vec::new();
    for gap in &gaps {
      let midpoint =
        gap.start + Duration::seconds((gap.duration_hours * 1800.0) as i64);
      match predictive.predict_state(entity_id, midpoint).await {
        Ok(state) => {
          if let Some(predicted) = &state.prediction {
            let placeholder = ActivityRecord {
              activity_id: Uuid::new_v4(),
              entity_id,
              kind: predicted.activity_kind,
              timestamp: midpoint,
              location: predicted.location.clone(),
              source_data: None,
              confidence: state.confidence,
              data_source: "prediction".to_owned(),
              source_record_id: None,
              is_predicted: true,
              prediction_metadata: Some(PredictionMetadata {
                method:     state.method.as_str().to_owned(),
                evidence:   state.evidence.clone(),
                confidence: state.confidence,
              }),
            };
            predictions.push(GapPrediction {
              gap: *gap,
              timestamp: midpoint,
              prediction: state,
              placeholder,
            });
          }
        }
        Err(err) => {
          tracing::warn!(entity_id = %entity_id, error = %err, "gap prediction failed");
        }
      }
    }

    Ok(TimelineWithPredictions { timeline, gaps, predictions })
  }
}

// ─── Grouping helpers ────────────────────────────────────────────────────────

fn group_by_hour(activities: &[ActivityRecord]) -> Vec<HourBucket> {
  let mut buckets: Vec<HourBucket> = Vec::new();

  for rec in activities {
    let hour = rec.timestamp.format("%Y-%m-%d %H:00").to_string();
    let index = match buckets.iter().position(|b| b.hour == hour) {
      Some(index) => index,
      None => {
        buckets.push(HourBucket {
          hour,
          count: 0,
          locations: Vec::new(),
          activity_kinds: Vec::new(),
        });
        buckets.len() - 1
      }
    };

    let bucket = &mut buckets[index];
    bucket.count += 1;
    let label = rec.location.label().to_owned();
    if !bucket.locations.contains(&label) {
      bucket.locations.push(label);
    }
    if !bucket.activity_kinds.contains(&rec.kind) {
      bucket.activity_kinds.push(rec.kind);
    }
  }

  buckets
}

fn compute_stats(activities: &[ActivityRecord]) -> TimelineStats {
  let mut by_kind: BTreeMap<ActivityKind, u64> = BTreeMap::new();
  let mut by_location: BTreeMap<String, u64> = BTreeMap::new();

  for rec in activities {
    *by_kind.entry(rec.kind).or_insert(0) += 1;
    *by_location.entry(rec.location.label().to_owned()).or_insert(0) += 1;
  }

  let confidence_average = if activities.is_empty() {
    0.0
  } else {
    activities.iter().map(|rec| rec.confidence).sum::<f64>() / activities.len() as f64
  };

  TimelineStats {
    total_activities: activities.len(),
    by_kind,
    by_location,
    confidence_average,
    predicted_activities: activities.iter().filter(|rec| rec.is_predicted).count(),
  }
}
