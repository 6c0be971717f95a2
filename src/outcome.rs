//! Final assessment: weighted overall score, θ-band competency, pass/fail, confidence.
//!
//! Policy: concept weights are normalized over the concepts that received at least
//! one question. Concepts never reached are excluded from the denominator, so a
//! session that only reached one concept is scored on that concept alone.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::config::{bands_are_valid, OutcomeConfig, ScoringConfig};
use crate::domain::{CompetencyLevel, ConceptBreakdown, ConceptMastery, FinalAssessment, Rubric, VivaSession};

/// Weighted mean of mastery over reached concepts; 0 when nothing was reached.
pub fn overall_score(rubric: &Rubric, mastery: &BTreeMap<String, ConceptMastery>) -> f64 {
  let mut weighted = 0.0;
  let mut total_weight = 0.0;
  for concept in &rubric.concepts {
    let Some(m) = mastery.get(&concept.id) else { continue };
    if m.questions_answered == 0 {
      continue;
    }
    weighted += concept.weight as f64 * m.mastery;
    total_weight += concept.weight as f64;
  }
  if total_weight > 0.0 { weighted / total_weight } else { 0.0 }
}

/// `bands` are the exclusive upper θ bounds of NOVICE..ADVANCED.
pub fn competency_for(theta: f64, bands: &[f64]) -> CompetencyLevel {
  const LEVELS: [CompetencyLevel; 4] = [
    CompetencyLevel::Novice,
    CompetencyLevel::Beginner,
    CompetencyLevel::Intermediate,
    CompetencyLevel::Advanced,
  ];
  LEVELS
    .iter()
    .zip(bands)
    .find(|(_, upper)| theta < **upper)
    .map(|(level, _)| *level)
    .unwrap_or(CompetencyLevel::Expert)
}

#[derive(Clone, Debug)]
pub struct OutcomeClassifier {
  outcome: OutcomeConfig,
  scoring: ScoringConfig,
}

impl OutcomeClassifier {
  pub fn new(outcome: OutcomeConfig, scoring: ScoringConfig) -> Self {
    Self { outcome, scoring }
  }

  /// Bands fixed by the session's rubric snapshot, else the configured ones.
  pub fn bands_for<'a>(&'a self, rubric: &'a Rubric) -> &'a [f64] {
    match &rubric.competency_bands {
      Some(b) if bands_are_valid(b) => b,
      _ => &self.outcome.competency_bands,
    }
  }

  pub fn classify(&self, session: &VivaSession, now: DateTime<Utc>) -> FinalAssessment {
    let rubric = &session.rubric;
    let overall = overall_score(rubric, &session.mastery);
    let level = competency_for(session.theta, self.bands_for(rubric));
    let passed = overall * 100.0 >= self.outcome.passing_percentage;

    let mut breakdown = vec![];
    let mut strengths = vec![];
    let mut improvements = vec![];
    for concept in rubric.ordered_concepts() {
      let Some(m) = session.mastery.get(&concept.id) else { continue };
      breakdown.push(ConceptBreakdown {
        concept_id: concept.id.clone(),
        concept_name: concept.name.clone(),
        weight: concept.weight,
        mastery: m.mastery,
        questions_answered: m.questions_answered,
      });
      if m.mastery >= self.scoring.strength_threshold {
        strengths.push(concept.name.clone());
      } else if m.mastery < self.scoring.pass_threshold {
        improvements.push(concept.name.clone());
      }
      for id in &m.misconceptions {
        if let Some(mc) = concept.misconceptions.iter().find(|mc| &mc.id == id) {
          if !mc.correction.is_empty() && !improvements.contains(&mc.correction) {
            improvements.push(mc.correction.clone());
          }
        }
      }
    }

    let selectable = rubric.selectable_concept_count();
    let coverage = if selectable == 0 {
      0.0
    } else {
      (breakdown.len() as f64 / selectable as f64).min(1.0)
    };
    let se = session.standard_error;
    let confidence = coverage / (1.0 + se * se);

    FinalAssessment {
      overall_score: overall,
      competency_level: level,
      passed,
      theta: session.theta,
      standard_error: se,
      confidence,
      breakdown,
      strengths,
      improvements,
      computed_at: now,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Concept, RubricStatus};

  fn concept(id: &str, weight: u32) -> Concept {
    Concept {
      id: id.into(),
      name: id.to_uppercase(),
      weight,
      order: 0,
      keywords: vec![],
      questions: vec![],
      misconceptions: vec![],
    }
  }

  fn rubric() -> Rubric {
    Rubric {
      id: "r".into(),
      assignment_id: "a".into(),
      name: "R".into(),
      status: RubricStatus::Active,
      competency_bands: None,
      concepts: vec![concept("c1", 2), concept("c2", 1), concept("c3", 1)],
    }
  }

  fn mastery(concept_id: &str, value: f64, answered: u32) -> ConceptMastery {
    let mut m = ConceptMastery::new("s", concept_id);
    m.mastery = value;
    m.score = value * answered as f64;
    m.questions_answered = answered;
    m
  }

  #[test]
  fn test_only_reached_concepts_count() {
    let mut map = BTreeMap::new();
    map.insert("c1".to_string(), mastery("c1", 0.8, 2));
    assert!((overall_score(&rubric(), &map) - 0.8).abs() < 1e-9);
  }

  #[test]
  fn test_weighted_average_over_reached() {
    let mut map = BTreeMap::new();
    map.insert("c1".to_string(), mastery("c1", 0.9, 1));
    map.insert("c2".to_string(), mastery("c2", 0.3, 1));
    // (2*0.9 + 1*0.3) / 3
    assert!((overall_score(&rubric(), &map) - 0.7).abs() < 1e-9);
  }

  #[test]
  fn test_nothing_reached_scores_zero() {
    assert_eq!(overall_score(&rubric(), &BTreeMap::new()), 0.0);
    let mut zero_weight = rubric();
    zero_weight.concepts[0].weight = 0;
    let mut map = BTreeMap::new();
    map.insert("c1".to_string(), mastery("c1", 0.9, 1));
    assert_eq!(overall_score(&zero_weight, &map), 0.0);
  }

  #[test]
  fn test_competency_bands() {
    let bands = [-1.5, -0.5, 0.5, 1.5];
    assert_eq!(competency_for(-4.0, &bands), CompetencyLevel::Novice);
    assert_eq!(competency_for(-1.5, &bands), CompetencyLevel::Beginner);
    assert_eq!(competency_for(0.0, &bands), CompetencyLevel::Intermediate);
    assert_eq!(competency_for(0.5, &bands), CompetencyLevel::Advanced);
    assert_eq!(competency_for(1.5, &bands), CompetencyLevel::Expert);
    assert_eq!(competency_for(4.0, &bands), CompetencyLevel::Expert);
  }

  #[test]
  fn test_rubric_bands_override_config() {
    let classifier = OutcomeClassifier::new(OutcomeConfig::default(), ScoringConfig::default());
    let mut r = rubric();
    assert_eq!(classifier.bands_for(&r), &[-1.5, -0.5, 0.5, 1.5]);
    r.competency_bands = Some(vec![-2.0, -1.0, 1.0, 2.0]);
    assert_eq!(classifier.bands_for(&r), &[-2.0, -1.0, 1.0, 2.0]);
    r.competency_bands = Some(vec![1.0]);
    assert_eq!(classifier.bands_for(&r), &[-1.5, -0.5, 0.5, 1.5]);
  }
}
