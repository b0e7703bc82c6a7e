//! Predictive monitoring — state prediction, next-location prediction, and
//! anomaly detection over historical activity.
//!
//! Nothing here is trained: predictions come from frequency counting over
//! windowed history and a transition table over recent movement. Confidence
//! values are heuristic weights, not probabilities.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use muster_core::{
  Error, Result,
  activity::{ActivityKind, ActivityRecord, Location},
  alert::Severity,
  store::CampusStore,
};
use serde::Serialize;
use uuid::Uuid;

/// How much history feeds the time-pattern model.
const STATE_HISTORY_LIMIT: usize = 100;
/// How much located history feeds the transition table.
const TRANSITION_HISTORY_LIMIT: usize = 50;
/// Fixed confidence of the most-recent-record fallback.
const FALLBACK_CONFIDENCE: f64 = 0.3;
/// Upper bound on time-pattern confidence.
const PATTERN_CONFIDENCE_CAP: f64 = 0.9;
/// Whole hours between adjacent records beyond which a gap is anomalous.
const GAP_HOURS: i64 = 12;

// ─── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionMethod {
  InsufficientData,
  MostRecentFallback,
  TimePatternMatching,
  MarkovTransition,
  NoTransitions,
}

impl PredictionMethod {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::InsufficientData => "insufficient_data",
      Self::MostRecentFallback => "most_recent_fallback",
      Self::TimePatternMatching => "time_pattern_matching",
      Self::MarkovTransition => "markov_transition",
      Self::NoTransitions => "no_transitions",
    }
  }
}

/// Where and what an entity is predicted to be doing at a point in time.
#[derive(Debug, Clone, Serialize)]
pub struct PredictedState {
  pub location:      Location,
  pub activity_kind: ActivityKind,
  pub timestamp:     DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatePrediction {
  pub prediction:  Option<PredictedState>,
  pub confidence:  f64,
  pub evidence:    Vec<String>,
  pub method:      PredictionMethod,
  /// Size of the similar-time sample backing a pattern match.
  pub sample_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextLocation {
  pub location_id:      String,
  pub transition_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Alternative {
  pub location_id: String,
  pub probability: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct NextLocationPrediction {
  pub prediction:   Option<NextLocation>,
  pub confidence:   f64,
  pub evidence:     Vec<String>,
  pub method:       PredictionMethod,
  /// Up to three runner-up destinations with their probabilities.
  pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
  UnusualGap,
  UnusualLocation,
}

/// A single rule firing. Binary per rule; no numeric score is computed.
#[derive(Debug, Clone, Serialize)]
pub struct Anomaly {
  pub kind:        AnomalyKind,
  pub severity:    Severity,
  pub description: String,
  pub timestamp:   DateTime<Utc>,
  pub evidence:    Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
  pub has_anomalies:     bool,
  pub anomalies:         Vec<Anomaly>,
  pub time_window_hours: u32,
  pub total_activities:  usize,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct PredictiveEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for PredictiveEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store) }
  }
}

impl<S> PredictiveEngine<S>
where
  S: CampusStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Predict where an entity is and what it is doing at `target_time`,
  /// using only records strictly before that time.
  pub async fn predict_state(
    &self,
    entity_id: Uuid,
    target_time: DateTime<Utc>,
  ) -> Result<StatePrediction> {
    self
      .store
      .get_entity(entity_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(entity_id))?;

    let history = self
      .store
      .activities_before(entity_id, target_time, STATE_HISTORY_LIMIT)
      .await
      .map_err(Error::store)?;

    if history.is_empty() {
      return Ok(StatePrediction {
        prediction:  None,
        confidence:  0.0,
        evidence:    vec!["No historical data available".to_owned()],
        method:      PredictionMethod::InsufficientData,
        sample_size: None,
      });
    }

    Ok(pattern_prediction(&history, target_time))
  }

  /// Predict the most likely next location from the transition table over
  /// recent located movement.
  pub async fn predict_next_location(
    &self,
    entity_id: Uuid,
  ) -> Result<NextLocationPrediction> {
    let recent = self
      .store
      .activities_with_location(entity_id, TRANSITION_HISTORY_LIMIT)
      .await
      .map_err(Error::store)?;

    if recent.len() < 2 {
      return Ok(NextLocationPrediction {
        prediction:   None,
        confidence:   0.0,
        evidence:     vec!["Insufficient movement history".to_owned()],
        method:       PredictionMethod::InsufficientData,
        alternatives: Vec::new(),
      });
    }

    // Adjacent pairs are taken in retrieval order (newest first): each
    // edge runs from the more recent record's location to the older one's.
    let mut transitions: Vec<(String, String, usize)> = Vec::new();
    for pair in recent.windows(2) {
      let from = located_id(&pair[0]);
      let to = located_id(&pair[1]);
      match transitions
        .iter_mut()
        .find(|(f, t, _)| *f == from && *t == to)
      {
        Some((_, _, n)) => *n += 1,
        None => transitions.push((from.to_owned(), to.to_owned(), 1)),
      }
    }

    let current = located_id(&recent[0]).to_owned();

    let mut outgoing: Vec<(String, usize)> = transitions
      .into_iter()
      .filter(|(from, _, _)| *from == current)
      .map(|(_, to, count)| (to, count))
      .collect();

    if outgoing.is_empty() {
      return Ok(NextLocationPrediction {
        prediction:   None,
        confidence:   0.0,
        evidence:     vec!["No historical transitions from current location".to_owned()],
        method:       PredictionMethod::NoTransitions,
        alternatives: Vec::new(),
      });
    }

    // Stable sort: ties keep their first-seen order in the scan.
    outgoing.sort_by(|a, b| b.1.cmp(&a.1));

    let total: usize = outgoing.iter().map(|(_, count)| count).sum();
    let (top_location, top_count) = outgoing[0].clone();
    let confidence = top_count as f64 / total as f64;

    let alternatives = outgoing
      .iter()
      .skip(1)
      .take(3)
      .map(|(location_id, count)| Alternative {
        location_id: location_id.clone(),
        probability: *count as f64 / total as f64,
      })
      .collect();

    Ok(NextLocationPrediction {
      prediction: Some(NextLocation {
        location_id:      top_location.clone(),
        transition_count: top_count as u64,
      }),
      confidence,
      evidence: vec![
        format!(
          "{top_count} out of {total} transitions from {current} went to {top_location}"
        ),
        format!("Transition probability: {:.1}%", confidence * 100.0),
      ],
      method: PredictionMethod::MarkovTransition,
      alternatives,
    })
  }

  /// Flag unusual gaps and rarely-visited locations in the trailing window.
  pub async fn detect_anomalies(
    &self,
    entity_id: Uuid,
    window_hours: u32,
  ) -> Result<AnomalyReport> {
    if window_hours == 0 {
      return Err(Error::InvalidInput(
        "anomaly window must be at least one hour".to_owned(),
      ));
    }

    let now = Utc::now();
    let since = now - Duration::hours(i64::from(window_hours));
    let recent = self
      .store
      .activities_in_range(entity_id, since, now)
      .await
      .map_err(Error::store)?;

    let mut anomalies = Vec::new();

    for pair in recent.windows(2) {
      let gap_hours = (pair[1].timestamp - pair[0].timestamp).num_hours();
      if gap_hours > GAP_HOURS {
        anomalies.push(Anomaly {
          kind:        AnomalyKind::UnusualGap,
          severity:    Severity::Medium,
          description: format!("{gap_hours} hour gap between activities"),
          timestamp:   pair[1].timestamp,
          evidence:    vec![
            format!(
              "Previous activity: {} at {}",
              pair[0].kind.discriminant(),
              pair[0].timestamp.format("%Y-%m-%d %H:%M")
            ),
            format!(
              "Next activity: {} at {}",
              pair[1].kind.discriminant(),
              pair[1].timestamp.format("%Y-%m-%d %H:%M")
            ),
          ],
        });
      }
    }

    // Locations visited exactly once in the window, in first-seen order.
    let mut counts: Vec<(&str, usize)> = Vec::new();
    for rec in &recent {
      let key = rarity_key(rec);
      match counts.iter_mut().find(|(k, _)| *k == key) {
        Some((_, n)) => *n += 1,
        None => counts.push((key, 1)),
      }
    }

    for (key, count) in counts {
      if count != 1 {
        continue;
      }
      let Some(visit) = recent.iter().find(|rec| rarity_key(rec) == key) else {
        continue;
      };
      anomalies.push(Anomaly {
        kind:        AnomalyKind::UnusualLocation,
        severity:    Severity::Low,
        description: format!("First visit to {key} in {window_hours}h window"),
        timestamp:   visit.timestamp,
        evidence:    vec![
          format!("Location: {key}"),
          format!("Activity: {}", visit.kind.discriminant()),
        ],
      });
    }

    Ok(AnomalyReport {
      has_anomalies: !anomalies.is_empty(),
      total_activities: recent.len(),
      time_window_hours: window_hours,
      anomalies,
    })
  }
}

// ─── Pattern matching helpers ────────────────────────────────────────────────

/// Time-of-day / day-of-week pattern matching over retrieved history
/// (newest first).
fn pattern_prediction(
  history: &[ActivityRecord],
  target_time: DateTime<Utc>,
) -> StatePrediction {
  let target_hour = i64::from(target_time.hour());
  let target_day = target_time.weekday();

  // Same weekday, hour of day within one. The hour distance is a plain
  // absolute difference, not circular: 23:00 and 00:00 do not match.
  let similar: Vec<&ActivityRecord> = history
    .iter()
    .filter(|rec| {
      let hour_diff = (i64::from(rec.timestamp.hour()) - target_hour).abs();
      rec.timestamp.weekday() == target_day && hour_diff <= 1
    })
    .collect();

  if similar.is_empty() {
    let most_recent = &history[0];
    return StatePrediction {
      prediction: Some(PredictedState {
        location:      most_recent.location.clone(),
        activity_kind: most_recent.kind,
        timestamp:     target_time,
      }),
      confidence: FALLBACK_CONFIDENCE,
      evidence: vec![
        format!(
          "Based on most recent activity at {}",
          most_recent.timestamp.format("%Y-%m-%d %H:%M")
        ),
        format!("Location: {}", most_recent.location.label()),
        format!("Activity: {}", most_recent.kind.discriminant()),
      ],
      method: PredictionMethod::MostRecentFallback,
      sample_size: None,
    };
  }

  // `similar` is non-empty, so both tables have a mode.
  let (modal_location, modal_location_count) =
    mode(similar.iter().map(|rec| rec.location.key().to_owned()))
      .expect("similar set is non-empty");
  let (modal_activity, _) =
    mode(similar.iter().map(|rec| rec.kind)).expect("similar set is non-empty");

  let confidence = modal_location_count as f64 / similar.len() as f64;

  let representative = similar
    .iter()
    .find(|rec| rec.location.key() == modal_location)
    .unwrap_or(&similar[0]);

  StatePrediction {
    prediction: Some(PredictedState {
      location:      representative.location.clone(),
      activity_kind: modal_activity,
      timestamp:     target_time,
    }),
    confidence: confidence.min(PATTERN_CONFIDENCE_CAP),
    evidence: vec![
      format!(
        "Historically active at this time on {}s",
        target_time.format("%A")
      ),
      format!(
        "{modal_location_count} out of {} similar time periods at {modal_location}",
        similar.len()
      ),
      format!("Common activity: {}", modal_activity.discriminant()),
      format!("Pattern confidence: {:.1}%", confidence * 100.0),
    ],
    method: PredictionMethod::TimePatternMatching,
    sample_size: Some(similar.len()),
  }
}

/// Most frequent key with its count. Ties go to the key seen first in
/// iteration order, so over newest-first input the most recently seen tied
/// value wins.
fn mode<K: PartialEq>(keys: impl Iterator<Item = K>) -> Option<(K, usize)> {
  let mut counts: Vec<(K, usize)> = Vec::new();
  for key in keys {
    match counts.iter_mut().find(|(existing, _)| *existing == key) {
      Some((_, n)) => *n += 1,
      None => counts.push((key, 1)),
    }
  }

  let mut best: Option<usize> = None;
  for (i, (_, count)) in counts.iter().enumerate() {
    if best.is_none_or(|b| *count > counts[b].1) {
      best = Some(i);
    }
  }
  best.map(|i| counts.swap_remove(i))
}

/// The transition table only sees records the store already filtered to a
/// present location id.
fn located_id(rec: &ActivityRecord) -> &str {
  rec.location.location_id.as_deref().unwrap_or_default()
}

/// Rarity counting keys on the raw location id with no name fallback.
fn rarity_key(rec: &ActivityRecord) -> &str {
  rec.location.location_id.as_deref().unwrap_or("unknown")
}
