//! Fixtures shared by unit tests.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;

use crate::domain::{AssignmentConfig, Review, Rubric, ScoredResponse, SessionStatus, VivaSession};
use crate::seeds::{seed_rubric, DEMO_ASSIGNMENT_ID};

pub fn sample_rubric() -> Arc<Rubric> {
  Arc::new(seed_rubric())
}

pub fn empty_session(rubric: Arc<Rubric>) -> VivaSession {
  let now = Utc::now();
  VivaSession {
    id: "s-test".into(),
    assignment_id: DEMO_ASSIGNMENT_ID.into(),
    student_id: "student-1".into(),
    attempt_number: 1,
    status: SessionStatus::InProgress,
    rubric,
    assignment: AssignmentConfig::default_for(DEMO_ASSIGNMENT_ID),
    started_at: now,
    completed_at: None,
    last_activity_at: now,
    time_spent_secs: 0,
    theta: 0.0,
    standard_error: 1.0,
    overall_score: None,
    competency_level: None,
    passed: None,
    flagged: false,
    flag_reason: None,
    review: Review::default(),
    termination: None,
    end_reason: None,
    turns: vec![],
    responses: vec![],
    mastery: BTreeMap::new(),
    assessment: None,
    pending: None,
  }
}

/// Session with one scored response per `(concept_id, correctness, misconception_id)`,
/// each answering the concept's first template at a nominal latency. Empty id = none.
pub fn session_with_responses(rubric: Arc<Rubric>, answers: &[(&str, f64, &str)]) -> VivaSession {
  let mut session = empty_session(rubric.clone());
  for (i, (concept_id, correctness, misconception)) in answers.iter().enumerate() {
    let concept = rubric.concept(concept_id).expect("fixture concept exists");
    let template = &concept.questions[0];
    session.responses.push(ScoredResponse {
      turn_number: (i as u32 + 1) * 2,
      template_id: template.id.clone(),
      concept_id: concept.id.clone(),
      discrimination: template.discrimination,
      difficulty: template.difficulty,
      correctness: *correctness,
      misconceptions: if misconception.is_empty() { vec![] } else { vec![misconception.to_string()] },
      latency_secs: template.expected_response_secs as f64,
      expected_response_secs: template.expected_response_secs,
    });
  }
  session
}
