//! Scoring a transcribed answer against the asked template.
//!
//! Correctness is the fraction of expected keywords present, optionally blended
//! with a semantic-similarity signal supplied by an external NLP collaborator.
//! Misconceptions of the asked concept are detected by keyword scan and apply a
//! flat penalty no matter how good the keyword overlap was.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::config::ScoringConfig;
use crate::domain::{Concept, QuestionTemplate, Severity};
use crate::util::{matches_keyword, tokenize};

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct TriggeredMisconception {
  pub id: String,
  pub severity: Severity,
  pub correction: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ResponseAssessment {
  /// Final correctness in [0,1], after blending and penalty.
  pub correctness: f64,
  pub keyword_overlap: f64,
  pub similarity: Option<f64>,
  pub matched_keywords: Vec<String>,
  pub missing_keywords: Vec<String>,
  pub misconceptions: Vec<TriggeredMisconception>,
}

#[derive(Clone, Debug)]
pub struct ResponseAssessor {
  scoring: ScoringConfig,
}

impl ResponseAssessor {
  pub fn new(scoring: ScoringConfig) -> Self {
    Self { scoring }
  }

  #[instrument(level = "debug", skip(self, concept, template, transcript), fields(template = %template.id, transcript_len = transcript.len()))]
  pub fn assess(
    &self,
    concept: &Concept,
    template: &QuestionTemplate,
    transcript: &str,
    similarity: Option<f64>,
  ) -> ResponseAssessment {
    let tokens = tokenize(transcript);

    // Templates without their own keywords fall back to the concept's.
    let expected = if template.expected_keywords.is_empty() { &concept.keywords } else { &template.expected_keywords };

    let mut matched = vec![];
    let mut missing = vec![];
    for entry in expected {
      let label = entry.split('|').next().unwrap_or(entry).trim().to_string();
      if matches_keyword(&tokens, entry) { matched.push(label); } else { missing.push(label); }
    }
    let overlap = if expected.is_empty() { 0.0 } else { matched.len() as f64 / expected.len() as f64 };

    let similarity = similarity.map(|s| s.clamp(0.0, 1.0));
    let w = self.scoring.semantic_weight;
    let mut correctness = match (expected.is_empty(), similarity) {
      (true, Some(s)) => s,
      (true, None) => 0.0,
      (false, Some(s)) => (1.0 - w) * overlap + w * s,
      (false, None) => overlap,
    };

    let misconceptions: Vec<TriggeredMisconception> = concept
      .misconceptions
      .iter()
      .filter(|m| m.keywords.iter().any(|k| matches_keyword(&tokens, k)))
      .map(|m| TriggeredMisconception { id: m.id.clone(), severity: m.severity, correction: m.correction.clone() })
      .collect();

    if !misconceptions.is_empty() {
      correctness -= self.scoring.misconception_penalty;
    }
    if tokens.is_empty() {
      correctness = 0.0;
    }
    let correctness = correctness.clamp(0.0, 1.0);

    debug!(target: "viva", template = %template.id, overlap, correctness, misconceptions = misconceptions.len(), "Response scored");
    ResponseAssessment {
      correctness,
      keyword_overlap: overlap,
      similarity,
      matched_keywords: matched,
      missing_keywords: missing,
      misconceptions,
    }
  }
}
