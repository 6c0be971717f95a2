//! Per-concept mastery accumulation for a session.

use std::collections::BTreeMap;

use uuid::Uuid;

use crate::config::ScoringConfig;
use crate::domain::{ConceptMastery, QuestionTemplate};

const NOTE_QUESTION_CHARS: usize = 80;

impl ConceptMastery {
  pub fn new(session_id: &str, concept_id: &str) -> Self {
    Self {
      id: Uuid::new_v4().to_string(),
      session_id: session_id.to_string(),
      concept_id: concept_id.to_string(),
      score: 0.0,
      mastery: 0.0,
      questions_answered: 0,
      correct_answers: 0,
      misconceptions: vec![],
      strengths: vec![],
      weaknesses: vec![],
    }
  }
}

/// Fold one scored answer into the concept's mastery record, creating it on first touch.
pub fn record_answer(
  mastery: &mut BTreeMap<String, ConceptMastery>,
  session_id: &str,
  concept_id: &str,
  template: &QuestionTemplate,
  correctness: f64,
  misconception_ids: &[String],
  scoring: &ScoringConfig,
) {
  let entry = mastery
    .entry(concept_id.to_string())
    .or_insert_with(|| ConceptMastery::new(session_id, concept_id));

  let correctness = correctness.clamp(0.0, 1.0);
  entry.questions_answered += 1;
  if correctness >= scoring.pass_threshold {
    entry.correct_answers += 1;
  }
  entry.score += correctness;
  entry.mastery = entry.score / entry.questions_answered as f64;

  for id in misconception_ids {
    if !entry.misconceptions.contains(id) {
      entry.misconceptions.push(id.clone());
    }
  }

  let question: String = template.text.chars().take(NOTE_QUESTION_CHARS).collect();
  if correctness >= scoring.strength_threshold && entry.strengths.len() < scoring.max_notes {
    entry.strengths.push(format!("Strong answer: {}", question));
  } else if correctness <= scoring.weakness_threshold && entry.weaknesses.len() < scoring.max_notes {
    entry.weaknesses.push(format!("Struggled with: {}", question));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::DifficultyTier;

  fn template(id: &str) -> QuestionTemplate {
    QuestionTemplate {
      id: id.into(),
      text: format!("Explain {id}"),
      code_snippet: None,
      tier: DifficultyTier::Medium,
      discrimination: 1.0,
      difficulty: 0.0,
      expected_keywords: vec![],
      sample_answer: String::new(),
      expected_response_secs: 60,
      active: true,
    }
  }

  #[test]
  fn test_running_average_and_correct_count() {
    let scoring = ScoringConfig::default();
    let mut m = BTreeMap::new();
    record_answer(&mut m, "s1", "c1", &template("a"), 1.0, &[], &scoring);
    record_answer(&mut m, "s1", "c1", &template("b"), 0.5, &[], &scoring);
    record_answer(&mut m, "s1", "c1", &template("c"), 0.0, &[], &scoring);

    let c1 = &m["c1"];
    assert_eq!(c1.questions_answered, 3);
    assert_eq!(c1.correct_answers, 1);
    assert!((c1.mastery - 0.5).abs() < 1e-9);
    assert_eq!(c1.strengths.len(), 1);
    assert_eq!(c1.weaknesses.len(), 1);
    assert_eq!(c1.session_id, "s1");
  }

  #[test]
  fn test_misconceptions_deduplicated() {
    let scoring = ScoringConfig::default();
    let mut m = BTreeMap::new();
    let ids = vec!["m1".to_string()];
    record_answer(&mut m, "s1", "c1", &template("a"), 0.2, &ids, &scoring);
    record_answer(&mut m, "s1", "c1", &template("b"), 0.2, &["m1".to_string(), "m2".to_string()], &scoring);
    assert_eq!(m["c1"].misconceptions, vec!["m1", "m2"]);
  }

  #[test]
  fn test_notes_are_capped() {
    let scoring = ScoringConfig { max_notes: 2, ..ScoringConfig::default() };
    let mut m = BTreeMap::new();
    for i in 0..5 {
      record_answer(&mut m, "s1", "c1", &template(&format!("q{i}")), 0.95, &[], &scoring);
    }
    assert_eq!(m["c1"].strengths.len(), 2);
    assert!(m["c1"].weaknesses.is_empty());
  }
}
