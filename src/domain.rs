//! Domain models: the rubric tree (rubric → concepts → templates/misconceptions),
//! the viva session with its turn log, per-concept mastery and the final assessment.
//!
//! The rubric is an ownership tree. Back-references (template → concept) are
//! resolved by id lookups on the rubric, never stored as pointers.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RubricStatus {
  #[default]
  Draft,
  Active,
  Archived,
}

/// Informational only; selection uses the IRT parameters.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
  Easy,
  #[default]
  Medium,
  Hard,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
  Low,
  #[default]
  Medium,
  High,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Misconception {
  pub id: String,
  #[serde(default)] pub keywords: Vec<String>,
  #[serde(default)] pub correction: String,
  #[serde(default)] pub severity: Severity,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuestionTemplate {
  pub id: String,
  pub text: String,
  #[serde(default)] pub code_snippet: Option<String>,
  #[serde(default)] pub tier: DifficultyTier,
  /// IRT discrimination `a`. Must be > 0 for the template to be selectable.
  pub discrimination: f64,
  /// IRT difficulty `b`.
  pub difficulty: f64,
  /// Entries may list synonyms separated by `|`.
  #[serde(default)] pub expected_keywords: Vec<String>,
  #[serde(default)] pub sample_answer: String,
  #[serde(default = "default_expected_secs")] pub expected_response_secs: u32,
  #[serde(default = "default_true")] pub active: bool,
}

fn default_expected_secs() -> u32 { 90 }
fn default_true() -> bool { true }
fn default_weight() -> u32 { 1 }

impl QuestionTemplate {
  pub fn is_selectable(&self) -> bool {
    self.active
      && self.discrimination.is_finite()
      && self.discrimination > 0.0
      && self.difficulty.is_finite()
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Concept {
  pub id: String,
  pub name: String,
  /// Relative weight; normalized over reached concepts at aggregation time.
  #[serde(default = "default_weight")] pub weight: u32,
  #[serde(default)] pub order: u32,
  #[serde(default)] pub keywords: Vec<String>,
  #[serde(default)] pub questions: Vec<QuestionTemplate>,
  #[serde(default)] pub misconceptions: Vec<Misconception>,
}

impl Concept {
  /// A concept counts toward content coverage only if it can actually be asked.
  pub fn is_selectable(&self) -> bool {
    self.questions.iter().any(QuestionTemplate::is_selectable)
  }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Rubric {
  pub id: String,
  pub assignment_id: String,
  pub name: String,
  #[serde(default)] pub status: RubricStatus,
  /// Overrides the configured θ bands for sessions created against this rubric.
  #[serde(default)] pub competency_bands: Option<Vec<f64>>,
  #[serde(default)] pub concepts: Vec<Concept>,
}

impl Rubric {
  pub fn concept(&self, concept_id: &str) -> Option<&Concept> {
    self.concepts.iter().find(|c| c.id == concept_id)
  }

  /// Resolve a template together with the concept that owns it.
  pub fn template(&self, template_id: &str) -> Option<(&Concept, &QuestionTemplate)> {
    self.concepts.iter().find_map(|c| {
      c.questions.iter().find(|q| q.id == template_id).map(|q| (c, q))
    })
  }

  pub fn selectable_question_count(&self) -> usize {
    self.concepts
      .iter()
      .flat_map(|c| c.questions.iter())
      .filter(|q| q.is_selectable())
      .count()
  }

  pub fn selectable_concept_count(&self) -> usize {
    self.concepts.iter().filter(|c| c.is_selectable()).count()
  }

  /// Concepts in display order.
  pub fn ordered_concepts(&self) -> Vec<&Concept> {
    let mut v: Vec<&Concept> = self.concepts.iter().collect();
    v.sort_by_key(|c| c.order);
    v
  }
}

/// Trigger policy for a viva on an assignment.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
  #[default]
  Manual,
  OnSubmission,
  OnDeadline,
}

/// Per-assignment viva configuration, passed explicitly into `start_session`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AssignmentConfig {
  pub id: String,
  #[serde(default = "default_true")] pub enabled: bool,
  #[serde(default)] pub trigger: TriggerType,
}

impl AssignmentConfig {
  pub fn default_for(assignment_id: &str) -> Self {
    Self { id: assignment_id.to_string(), enabled: true, trigger: TriggerType::Manual }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
  NotStarted,
  InProgress,
  Completed,
  Submitted,
  Failed,
  Abandoned,
}

impl SessionStatus {
  pub fn is_terminal(self) -> bool {
    matches!(
      self,
      SessionStatus::Completed | SessionStatus::Submitted | SessionStatus::Failed | SessionStatus::Abandoned
    )
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s.to_ascii_uppercase().as_str() {
      "NOT_STARTED" => Some(SessionStatus::NotStarted),
      "IN_PROGRESS" => Some(SessionStatus::InProgress),
      "COMPLETED" => Some(SessionStatus::Completed),
      "SUBMITTED" => Some(SessionStatus::Submitted),
      "FAILED" => Some(SessionStatus::Failed),
      "ABANDONED" => Some(SessionStatus::Abandoned),
      _ => None,
    }
  }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
  MaxQuestions,
  PrecisionReached,
  ContentCovered,
  ItemPoolExhausted,
  StudentSubmitted,
  Abandoned,
  Error,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetencyLevel {
  Novice,
  Beginner,
  Intermediate,
  Advanced,
  Expert,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Speaker {
  Ai,
  Student,
}

/// One entry of the append-only conversation log.
#[derive(Clone, Debug, Serialize)]
pub struct ConversationTurn {
  pub id: String,
  pub session_id: String,
  pub turn_number: u32,
  pub speaker: Speaker,
  pub text: String,
  /// Template asked (AI) or answered (STUDENT) in this turn.
  pub template_id: Option<String>,
  pub timestamp: DateTime<Utc>,
}

/// Scored answer to one template; the estimator recomputes from this history.
#[derive(Clone, Debug, Serialize)]
pub struct ScoredResponse {
  pub turn_number: u32,
  pub template_id: String,
  pub concept_id: String,
  pub discrimination: f64,
  pub difficulty: f64,
  pub correctness: f64,
  pub misconceptions: Vec<String>,
  pub latency_secs: f64,
  pub expected_response_secs: u32,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConceptMastery {
  pub id: String,
  pub session_id: String,
  pub concept_id: String,
  /// Sum of per-question correctness.
  pub score: f64,
  pub mastery: f64,
  pub questions_answered: u32,
  pub correct_answers: u32,
  pub misconceptions: Vec<String>,
  pub strengths: Vec<String>,
  pub weaknesses: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
pub struct ConceptBreakdown {
  pub concept_id: String,
  pub concept_name: String,
  pub weight: u32,
  pub mastery: f64,
  pub questions_answered: u32,
}

/// Computed once when the session terminates. Never mutated afterwards;
/// instructor overrides live on the session's review fields.
#[derive(Clone, Debug, Serialize)]
pub struct FinalAssessment {
  pub overall_score: f64,
  pub competency_level: CompetencyLevel,
  pub passed: bool,
  pub theta: f64,
  pub standard_error: f64,
  pub confidence: f64,
  pub breakdown: Vec<ConceptBreakdown>,
  pub strengths: Vec<String>,
  pub improvements: Vec<String>,
  pub computed_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct Review {
  pub reviewed: bool,
  pub reviewed_by: Option<String>,
  pub reviewed_at: Option<DateTime<Utc>>,
  pub score_override: Option<f64>,
  pub override_reason: Option<String>,
}

/// The question currently awaiting an answer.
#[derive(Clone, Debug)]
pub struct PendingQuestion {
  pub template_id: String,
  pub concept_id: String,
  pub asked_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct VivaSession {
  pub id: String,
  pub assignment_id: String,
  pub student_id: String,
  pub attempt_number: u32,
  pub status: SessionStatus,
  /// Snapshot taken at start; later rubric edits do not reach this session.
  pub rubric: Arc<Rubric>,
  pub assignment: AssignmentConfig,
  pub started_at: DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
  pub last_activity_at: DateTime<Utc>,
  pub time_spent_secs: i64,
  pub theta: f64,
  pub standard_error: f64,
  pub overall_score: Option<f64>,
  pub competency_level: Option<CompetencyLevel>,
  pub passed: Option<bool>,
  pub flagged: bool,
  pub flag_reason: Option<String>,
  pub review: Review,
  pub termination: Option<TerminationReason>,
  pub end_reason: Option<String>,
  pub turns: Vec<ConversationTurn>,
  pub responses: Vec<ScoredResponse>,
  /// Keyed by concept id; created lazily on first question touching the concept.
  pub mastery: BTreeMap<String, ConceptMastery>,
  pub assessment: Option<FinalAssessment>,
  pub pending: Option<PendingQuestion>,
}

impl VivaSession {
  pub fn next_turn_number(&self) -> u32 {
    self.turns.last().map(|t| t.turn_number + 1).unwrap_or(1)
  }

  pub fn asked_template_ids(&self) -> impl Iterator<Item = &str> {
    self.turns
      .iter()
      .filter(|t| t.speaker == Speaker::Ai)
      .filter_map(|t| t.template_id.as_deref())
  }

  pub fn questions_answered(&self) -> usize {
    self.responses.len()
  }
}
