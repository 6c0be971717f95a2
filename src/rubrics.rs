//! Read-only rubric snapshots keyed by id.
//!
//! Sessions hold an `Arc<Rubric>` taken at start. Publishing a new version
//! swaps the `Arc` in the store, so in-flight sessions keep their snapshot.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};

use crate::config::bands_are_valid;
use crate::domain::{Rubric, RubricStatus};
use crate::error::{VivaError, VivaResult};
use crate::seeds::seed_rubric;

/// Structural checks. Non-positive discrimination is only warned about: such
/// templates are kept but never selected.
pub fn validate_rubric(r: &Rubric) -> VivaResult<()> {
  if r.id.trim().is_empty() || r.assignment_id.trim().is_empty() {
    return Err(VivaError::Validation("rubric id and assignment_id must not be empty".into()));
  }
  if let Some(b) = &r.competency_bands {
    if !bands_are_valid(b) {
      return Err(VivaError::Validation(format!(
        "rubric {}: competency_bands must be four strictly ascending numbers",
        r.id
      )));
    }
  }
  let mut concept_ids = HashSet::new();
  let mut template_ids = HashSet::new();
  for c in &r.concepts {
    if !concept_ids.insert(c.id.as_str()) {
      return Err(VivaError::Validation(format!("rubric {}: duplicate concept id {}", r.id, c.id)));
    }
    for q in &c.questions {
      if !template_ids.insert(q.id.as_str()) {
        return Err(VivaError::Validation(format!("rubric {}: duplicate template id {}", r.id, q.id)));
      }
      if !(q.discrimination > 0.0) {
        warn!(target: "viva", rubric = %r.id, template = %q.id, a = q.discrimination, "Template has non-positive discrimination; it will never be selected");
      }
    }
  }
  Ok(())
}

pub struct RubricStore {
  by_id: RwLock<HashMap<String, Arc<Rubric>>>,
}

impl RubricStore {
  /// Build from the configured bank plus the built-in seed.
  /// Bank entries win over the seed; a second ACTIVE rubric for one assignment is skipped.
  pub fn from_bank(bank: &[Rubric]) -> Self {
    let mut map: HashMap<String, Arc<Rubric>> = HashMap::new();
    let mut active_assignments: HashSet<String> = HashSet::new();

    for r in bank {
      if let Err(e) = validate_rubric(r) {
        error!(target: "viva", rubric = %r.id, error = %e, "Skipping bank rubric");
        continue;
      }
      if r.status == RubricStatus::Active && !active_assignments.insert(r.assignment_id.clone()) {
        error!(target: "viva", rubric = %r.id, assignment = %r.assignment_id, "Skipping bank rubric: assignment already has an ACTIVE rubric");
        continue;
      }
      map.insert(r.id.clone(), Arc::new(r.clone()));
    }

    let seed = seed_rubric();
    if !map.contains_key(&seed.id) && !active_assignments.contains(&seed.assignment_id) {
      map.insert(seed.id.clone(), Arc::new(seed));
    }

    for r in map.values() {
      info!(target: "viva", rubric = %r.id, assignment = %r.assignment_id, status = ?r.status, questions = r.selectable_question_count(), "Startup rubric inventory");
    }
    Self { by_id: RwLock::new(map) }
  }

  /// Publish a snapshot from the authoring service. An ACTIVE rubric archives
  /// any other ACTIVE rubric bound to the same assignment.
  #[instrument(level = "info", skip(self, rubric), fields(rubric = %rubric.id, assignment = %rubric.assignment_id))]
  pub async fn publish(&self, rubric: Rubric) -> VivaResult<Arc<Rubric>> {
    validate_rubric(&rubric)?;
    let mut by_id = self.by_id.write().await;

    if rubric.status == RubricStatus::Active {
      let to_archive: Vec<String> = by_id
        .values()
        .filter(|r| r.id != rubric.id && r.assignment_id == rubric.assignment_id && r.status == RubricStatus::Active)
        .map(|r| r.id.clone())
        .collect();
      for id in to_archive {
        if let Some(old) = by_id.get(&id).cloned() {
          let mut archived = (*old).clone();
          archived.status = RubricStatus::Archived;
          by_id.insert(id.clone(), Arc::new(archived));
          info!(target: "viva", archived = %id, "Archived previously active rubric");
        }
      }
    }

    let snapshot = Arc::new(rubric);
    by_id.insert(snapshot.id.clone(), snapshot.clone());
    info!(target: "viva", status = ?snapshot.status, questions = snapshot.selectable_question_count(), "Rubric published");
    Ok(snapshot)
  }

  pub async fn get(&self, id: &str) -> Option<Arc<Rubric>> {
    self.by_id.read().await.get(id).cloned()
  }

  /// The ACTIVE rubric bound to an assignment, if any.
  pub async fn active_for(&self, assignment_id: &str) -> Option<Arc<Rubric>> {
    self.by_id
      .read()
      .await
      .values()
      .find(|r| r.assignment_id == assignment_id && r.status == RubricStatus::Active)
      .cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::seeds::DEMO_ASSIGNMENT_ID;

  fn rubric(id: &str, assignment: &str, status: RubricStatus) -> Rubric {
    let mut r = seed_rubric();
    r.id = id.into();
    r.assignment_id = assignment.into();
    r.status = status;
    r
  }

  #[tokio::test]
  async fn test_seed_is_loaded_by_default() {
    let store = RubricStore::from_bank(&[]);
    let active = store.active_for(DEMO_ASSIGNMENT_ID).await.unwrap();
    assert_eq!(active.id, "rust-fundamentals-v1");
    assert!(store.active_for("unknown").await.is_none());
  }

  #[tokio::test]
  async fn test_bank_active_rubric_replaces_seed_for_assignment() {
    let store = RubricStore::from_bank(&[rubric("custom", DEMO_ASSIGNMENT_ID, RubricStatus::Active)]);
    assert_eq!(store.active_for(DEMO_ASSIGNMENT_ID).await.unwrap().id, "custom");
    assert!(store.get("rust-fundamentals-v1").await.is_none());
  }

  #[tokio::test]
  async fn test_second_active_in_bank_is_skipped() {
    let store = RubricStore::from_bank(&[
      rubric("first", "hw1", RubricStatus::Active),
      rubric("second", "hw1", RubricStatus::Active),
    ]);
    assert_eq!(store.active_for("hw1").await.unwrap().id, "first");
    assert!(store.get("second").await.is_none());
  }

  #[tokio::test]
  async fn test_publish_archives_previous_active_without_touching_snapshots() {
    let store = RubricStore::from_bank(&[]);
    let before = store.active_for(DEMO_ASSIGNMENT_ID).await.unwrap();

    store.publish(rubric("v2", DEMO_ASSIGNMENT_ID, RubricStatus::Active)).await.unwrap();

    assert_eq!(store.active_for(DEMO_ASSIGNMENT_ID).await.unwrap().id, "v2");
    assert_eq!(store.get("rust-fundamentals-v1").await.unwrap().status, RubricStatus::Archived);
    // A session holding the old Arc still sees it ACTIVE.
    assert_eq!(before.status, RubricStatus::Active);
  }

  #[tokio::test]
  async fn test_publish_rejects_duplicate_template_ids() {
    let store = RubricStore::from_bank(&[]);
    let mut r = rubric("dup", "hw1", RubricStatus::Draft);
    let q = r.concepts[0].questions[0].clone();
    r.concepts[1].questions.push(q);
    assert!(matches!(store.publish(r).await, Err(VivaError::Validation(_))));
  }
}
