//! Entity resolution — canonicalising fragmentary identifier bundles.
//!
//! Two phases: an exact match over the lookup identifiers, then fuzzy
//! matching of the supplied name against every named entity using
//! Sørensen–Dice bigram similarity. Inactive entities stay matchable so
//! merged-away duplicates remain reachable for audit.

use std::sync::Arc;

use chrono::Utc;
use muster_core::{
  Error, Result,
  entity::{Entity, Identifiers, SourceLink},
  store::CampusStore,
};
use serde::Serialize;
use uuid::Uuid;

/// Fuzzy candidates at or below this similarity are discarded outright.
const CANDIDATE_FLOOR: f64 = 0.6;
/// The top fuzzy candidate must score strictly above this to resolve.
const RESOLVE_THRESHOLD: f64 = 0.8;

// ─── Result types ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionMethod {
  ExactMatch,
  FuzzyNameMatch,
  NoMatch,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolutionResult {
  pub resolved:   bool,
  pub entity:     Option<Entity>,
  /// 1.0 for exact matches, the Dice score for fuzzy ones, 0 otherwise.
  pub confidence: f64,
  pub method:     ResolutionMethod,
}

/// One scored fuzzy candidate.
struct NameMatch {
  entity: Entity,
  score:  f64,
}

// ─── Engine ──────────────────────────────────────────────────────────────────

pub struct ResolutionEngine<S> {
  store: Arc<S>,
}

impl<S> Clone for ResolutionEngine<S> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store) }
  }
}

impl<S> ResolutionEngine<S>
where
  S: CampusStore,
{
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Resolve an identifier bundle to a canonical entity.
  ///
  /// The exact phase wins outright when any lookup field matches; the store
  /// returns matches ordered by entity id, so "first match" is
  /// deterministic. The fuzzy phase only runs when the exact phase comes up
  /// empty and a name was supplied.
  pub async fn resolve(&self, identifiers: &Identifiers) -> Result<ResolutionResult> {
    if identifiers.has_lookup_fields() {
      let matches = self
        .store
        .find_by_identifiers(identifiers)
        .await
        .map_err(Error::store)?;
      if let Some(entity) = matches.into_iter().next() {
        return Ok(ResolutionResult {
          resolved:   true,
          entity:     Some(entity),
          confidence: 1.0,
          method:     ResolutionMethod::ExactMatch,
        });
      }
    }

    if let Some(name) = identifiers.name.as_deref().filter(|n| !n.is_empty()) {
      let candidates = self.fuzzy_name_candidates(name).await?;
      if let Some(top) = candidates.into_iter().next()
        && top.score > RESOLVE_THRESHOLD
      {
        return Ok(ResolutionResult {
          resolved:   true,
          confidence: top.score,
          entity:     Some(top.entity),
          method:     ResolutionMethod::FuzzyNameMatch,
        });
      }
    }

    Ok(ResolutionResult {
      resolved:   false,
      entity:     None,
      confidence: 0.0,
      method:     ResolutionMethod::NoMatch,
    })
  }

  /// Score every named entity against `search_name`; candidates above the
  /// floor, best first.
  ///
  /// Per entity the recorded score starts at the full-name similarity; each
  /// name variant replaces it only when strictly higher (and itself above
  /// the floor), so the recorded score is the running maximum.
  async fn fuzzy_name_candidates(&self, search_name: &str) -> Result<Vec<NameMatch>> {
    let normalized_search = normalize_name(search_name);
    let entities = self
      .store
      .find_named_entities()
      .await
      .map_err(Error::store)?;

    let mut candidates: Vec<NameMatch> = Vec::new();
    for entity in entities {
      let Some(full_name) = entity.profile.full_name.as_deref() else {
        continue;
      };
      let mut score = name_similarity(&normalized_search, full_name);

      for variant in &entity.identifiers.name_variants {
        let variant_score = name_similarity(&normalized_search, variant);
        if variant_score > score && variant_score > CANDIDATE_FLOOR {
          score = variant_score;
        }
      }

      if score > CANDIDATE_FLOOR {
        candidates.push(NameMatch { entity, score });
      }
    }

    // Best first; equal scores fall back to entity id so the winner is
    // deterministic.
    candidates.sort_by(|a, b| {
      b.score
        .partial_cmp(&a.score)
        .unwrap_or(std::cmp::Ordering::Equal)
        .then_with(|| a.entity.entity_id.cmp(&b.entity.entity_id))
    });

    Ok(candidates)
  }

  /// Append a provenance link recording that a source-system record was
  /// resolved onto `entity_id`.
  pub async fn link_records(
    &self,
    entity_id: Uuid,
    source_id: String,
    source_type: String,
    confidence: f64,
  ) -> Result<Entity> {
    if !(0.0..=1.0).contains(&confidence) {
      return Err(Error::InvalidInput(format!(
        "link confidence {confidence} outside [0, 1]"
      )));
    }

    let mut entity = self
      .store
      .get_entity(entity_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(entity_id))?;

    entity.resolved_sources.push(SourceLink {
      source_id,
      source_type,
      confidence,
      timestamp: Utc::now(),
    });

    self.store.update_entity(&entity).await.map_err(Error::store)?;
    Ok(entity)
  }

  /// Merge `secondary_id` into `primary_id`.
  ///
  /// Identifier union with primary precedence, provenance concatenation,
  /// and last-seen adoption when the secondary sighting is strictly more
  /// recent. The secondary is soft-deleted, never removed.
  pub async fn merge(&self, primary_id: Uuid, secondary_id: Uuid) -> Result<Entity> {
    if primary_id == secondary_id {
      return Err(Error::InvalidInput(
        "cannot merge an entity into itself".to_owned(),
      ));
    }

    let mut primary = self
      .store
      .get_entity(primary_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(primary_id))?;
    let mut secondary = self
      .store
      .get_entity(secondary_id)
      .await
      .map_err(Error::store)?
      .ok_or(Error::EntityNotFound(secondary_id))?;

    primary.identifiers.fill_missing_from(&secondary.identifiers);
    primary
      .resolved_sources
      .extend(secondary.resolved_sources.iter().cloned());

    let adopt_last_seen = match (&primary.last_seen, &secondary.last_seen) {
      (_, None) => false,
      (None, Some(_)) => true,
      (Some(p), Some(s)) => s.timestamp > p.timestamp,
    };
    if adopt_last_seen {
      primary.last_seen = secondary.last_seen.clone();
    }

    self.store.update_entity(&primary).await.map_err(Error::store)?;

    secondary.is_active = false;
    self
      .store
      .update_entity(&secondary)
      .await
      .map_err(Error::store)?;

    Ok(primary)
  }
}

// ─── Name matching ───────────────────────────────────────────────────────────

/// Lowercase, strip everything outside ASCII alphanumerics and whitespace,
/// collapse whitespace runs to single spaces.
pub(crate) fn normalize_name(name: &str) -> String {
  let mut out = String::with_capacity(name.len());
  let mut pending_space = false;
  for c in name.to_lowercase().chars() {
    if c.is_whitespace() {
      pending_space = true;
    } else if c.is_ascii_lowercase() || c.is_ascii_digit() {
      if pending_space && !out.is_empty() {
        out.push(' ');
      }
      pending_space = false;
      out.push(c);
    }
  }
  out
}

/// Dice bigram similarity between an already-normalized search string and a
/// raw candidate name.
pub(crate) fn name_similarity(normalized_search: &str, candidate: &str) -> f64 {
  strsim::sorensen_dice(normalized_search, &normalize_name(candidate))
}
