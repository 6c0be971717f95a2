//! Anomaly detection at termination and the instructor review/override step.
//!
//! Flags never block classification; they only mark a session for a human.
//! Overrides are recorded next to the computed assessment, never over it.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::ReviewConfig;
use crate::domain::{Severity, VivaSession};
use crate::error::{VivaError, VivaResult};

#[derive(Clone, Debug, PartialEq)]
pub enum FlagReason {
  LowConfidence,
  HighSeverityMisconceptions(usize),
  Contradiction { concept_id: String },
  TimingOutlier { turn_number: u32 },
}

impl fmt::Display for FlagReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      FlagReason::LowConfidence => write!(f, "low_confidence"),
      FlagReason::HighSeverityMisconceptions(n) => write!(f, "high_severity_misconceptions:{n}"),
      FlagReason::Contradiction { concept_id } => write!(f, "contradiction:{concept_id}"),
      FlagReason::TimingOutlier { turn_number } => write!(f, "timing_outlier:turn={turn_number}"),
    }
  }
}

/// Machine-readable reason string stored on the session.
pub fn flag_reason_string(reasons: &[FlagReason]) -> Option<String> {
  if reasons.is_empty() {
    None
  } else {
    Some(reasons.iter().map(ToString::to_string).collect::<Vec<_>>().join(";"))
  }
}

pub fn evaluate_flags(session: &VivaSession, cfg: &ReviewConfig) -> Vec<FlagReason> {
  let mut reasons = vec![];

  if session.standard_error > cfg.low_confidence_se {
    reasons.push(FlagReason::LowConfidence);
  }

  let high = session
    .responses
    .iter()
    .flat_map(|r| {
      let concept = session.rubric.concept(&r.concept_id);
      r.misconceptions.iter().filter(move |id| {
        concept
          .and_then(|c| c.misconceptions.iter().find(|m| &m.id == *id))
          .map(|m| m.severity == Severity::High)
          .unwrap_or(false)
      })
    })
    .count();
  if high >= cfg.high_severity_limit.max(1) {
    reasons.push(FlagReason::HighSeverityMisconceptions(high));
  }

  // A later answer on a concept swinging far from any earlier one on the same concept.
  let mut seen: HashMap<&str, Vec<f64>> = HashMap::new();
  let mut contradicted: Vec<&str> = vec![];
  for r in &session.responses {
    let earlier = seen.entry(r.concept_id.as_str()).or_default();
    if earlier.iter().any(|c| (r.correctness - c).abs() > cfg.contradiction_delta)
      && !contradicted.contains(&r.concept_id.as_str())
    {
      contradicted.push(r.concept_id.as_str());
    }
    earlier.push(r.correctness);
  }
  for concept_id in contradicted {
    reasons.push(FlagReason::Contradiction { concept_id: concept_id.to_string() });
  }

  for r in &session.responses {
    if r.expected_response_secs == 0 {
      continue;
    }
    let expected = r.expected_response_secs as f64;
    if r.latency_secs > cfg.slow_factor * expected || r.latency_secs < cfg.fast_factor * expected {
      reasons.push(FlagReason::TimingOutlier { turn_number: r.turn_number });
    }
  }

  reasons
}

/// Record an instructor review. Only the review fields change; repeated calls
/// replace the previous override while the computed assessment stays intact.
pub fn apply_review(
  session: &mut VivaSession,
  reviewer_id: &str,
  score_override: Option<f64>,
  override_reason: Option<String>,
  now: DateTime<Utc>,
) -> VivaResult<()> {
  if !session.status.is_terminal() {
    return Err(VivaError::InvalidState(format!(
      "session {} is {:?}; only terminal sessions can be reviewed",
      session.id, session.status
    )));
  }
  if reviewer_id.trim().is_empty() {
    return Err(VivaError::Validation("reviewerId must not be empty".into()));
  }
  if let Some(s) = score_override {
    if !(s.is_finite() && (0.0..=1.0).contains(&s)) {
      return Err(VivaError::Validation(format!("scoreOverride must be within [0, 1], got {s}")));
    }
  }

  session.review.reviewed = true;
  session.review.reviewed_by = Some(reviewer_id.to_string());
  session.review.reviewed_at = Some(now);
  session.review.score_override = score_override;
  session.review.override_reason = override_reason;
  Ok(())
}
