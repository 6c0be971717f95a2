//! Loading engine configuration (CAT policy, scoring, outcome, review thresholds,
//! per-assignment viva settings and an optional rubric bank) from TOML.
//!
//! See `VivaConfig` for the expected schema. Every section is optional.

use serde::Deserialize;
use tracing::{error, info, warn};

use crate::domain::{AssignmentConfig, Rubric};

#[derive(Clone, Debug, Deserialize, Default)]
pub struct VivaConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub scoring: ScoringConfig,
  #[serde(default)]
  pub outcome: OutcomeConfig,
  #[serde(default)]
  pub review: ReviewConfig,
  #[serde(default)]
  pub assignments: Vec<AssignmentConfig>,
  #[serde(default)]
  pub rubrics: Vec<Rubric>,
}

/// How a fractional correctness feeds the 2PL likelihood.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResponseModel {
  /// Correctness in [0,1] is used directly as a soft response.
  #[default]
  Soft,
  /// Correctness is thresholded at `scoring.pass_threshold` to {0,1}.
  Dichotomous,
}

/// Adaptive-testing policy: stopping rules, θ prior and bounds, session timeouts.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub max_questions: u32,
  pub min_questions: u32,
  /// Stop once SE(θ) drops below this (after `min_questions`).
  pub precision_threshold: f64,
  pub prior_standard_error: f64,
  /// θ is clamped to [-theta_bound, theta_bound].
  pub theta_bound: f64,
  pub response_model: ResponseModel,
  pub inactivity_timeout_mins: u64,
  pub sweep_interval_secs: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      max_questions: 10,
      min_questions: 3,
      precision_threshold: 0.4,
      prior_standard_error: 1.0,
      theta_bound: 4.0,
      response_model: ResponseModel::Soft,
      inactivity_timeout_mins: 15,
      sweep_interval_secs: 60,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
  /// A question counts as correct at or above this correctness.
  pub pass_threshold: f64,
  /// Subtracted from correctness when any misconception is detected.
  pub misconception_penalty: f64,
  /// Blend weight of the external semantic-similarity signal.
  pub semantic_weight: f64,
  pub strength_threshold: f64,
  pub weakness_threshold: f64,
  /// Cap on strengths/weaknesses notes per concept.
  pub max_notes: usize,
}

impl Default for ScoringConfig {
  fn default() -> Self {
    Self {
      pass_threshold: 0.6,
      misconception_penalty: 0.3,
      semantic_weight: 0.5,
      strength_threshold: 0.8,
      weakness_threshold: 0.3,
      max_notes: 5,
    }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct OutcomeConfig {
  /// Pass if overall score (as a percentage) reaches this.
  pub passing_percentage: f64,
  /// Upper θ boundaries for NOVICE, BEGINNER, INTERMEDIATE, ADVANCED; above is EXPERT.
  pub competency_bands: Vec<f64>,
}

impl Default for OutcomeConfig {
  fn default() -> Self {
    Self { passing_percentage: 60.0, competency_bands: vec![-1.5, -0.5, 0.5, 1.5] }
  }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
  /// Flag when SE(θ) at termination is above this.
  pub low_confidence_se: f64,
  /// Flag when this many HIGH-severity misconception detections occur.
  pub high_severity_limit: usize,
  /// Flag when correctness on one concept swings by more than this.
  pub contradiction_delta: f64,
  /// Latency above `slow_factor × expected` is a timing outlier.
  pub slow_factor: f64,
  /// Latency below `fast_factor × expected` is a timing outlier.
  pub fast_factor: f64,
}

impl Default for ReviewConfig {
  fn default() -> Self {
    Self {
      low_confidence_se: 0.8,
      high_severity_limit: 2,
      contradiction_delta: 0.6,
      slow_factor: 3.0,
      fast_factor: 0.1,
    }
  }
}

impl VivaConfig {
  pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
    let mut cfg: VivaConfig = toml::from_str(s)?;
    cfg.normalize();
    Ok(cfg)
  }

  /// Viva settings for an assignment; unlisted assignments are enabled with a manual trigger.
  pub fn assignment(&self, assignment_id: &str) -> AssignmentConfig {
    self.assignments
      .iter()
      .find(|a| a.id == assignment_id)
      .cloned()
      .unwrap_or_else(|| AssignmentConfig::default_for(assignment_id))
  }

  /// Repair settings that would break the stopping rules or band mapping.
  pub fn normalize(&mut self) {
    if self.engine.max_questions == 0 {
      warn!(target: "viva_backend", "engine.max_questions = 0; using 1");
      self.engine.max_questions = 1;
    }
    if self.engine.min_questions > self.engine.max_questions {
      warn!(target: "viva_backend", min = self.engine.min_questions, max = self.engine.max_questions, "engine.min_questions > max_questions; clamping");
      self.engine.min_questions = self.engine.max_questions;
    }
    if !(self.engine.theta_bound.is_finite() && self.engine.theta_bound > 0.0) {
      warn!(target: "viva_backend", bound = self.engine.theta_bound, "invalid engine.theta_bound; using 4.0");
      self.engine.theta_bound = 4.0;
    }
    if !(self.engine.prior_standard_error.is_finite() && self.engine.prior_standard_error > 0.0) {
      warn!(target: "viva_backend", "invalid engine.prior_standard_error; using 1.0");
      self.engine.prior_standard_error = 1.0;
    }
    if !bands_are_valid(&self.outcome.competency_bands) {
      warn!(target: "viva_backend", bands = ?self.outcome.competency_bands, "invalid outcome.competency_bands; using defaults");
      self.outcome.competency_bands = OutcomeConfig::default().competency_bands;
    }
    self.scoring.semantic_weight = self.scoring.semantic_weight.clamp(0.0, 1.0);
    self.scoring.misconception_penalty = self.scoring.misconception_penalty.clamp(0.0, 1.0);
  }
}

/// Four finite, strictly ascending boundaries.
pub fn bands_are_valid(bands: &[f64]) -> bool {
  bands.len() == 4
    && bands.iter().all(|b| b.is_finite())
    && bands.windows(2).all(|w| w[0] < w[1])
}

/// Attempt to load `VivaConfig` from VIVA_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_viva_config_from_env() -> Option<VivaConfig> {
  let path = std::env::var("VIVA_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match VivaConfig::from_toml_str(&s) {
      Ok(cfg) => {
        info!(target: "viva_backend", %path, rubrics = cfg.rubrics.len(), assignments = cfg.assignments.len(), "Loaded viva config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "viva_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "viva_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
