//! Two-parameter logistic (2PL) item response model and the ability estimator.
//!
//! The estimator re-derives θ from the complete response history on every
//! update: one Newton-Raphson step of the maximum-likelihood equation,
//! evaluated at the current θ, summed over all answered items.

use crate::config::{EngineConfig, ResponseModel};
use crate::domain::ScoredResponse;

/// P(correct | θ) = 1 / (1 + exp(-a(θ - b)))
pub fn probability(a: f64, b: f64, theta: f64) -> f64 {
  1.0 / (1.0 + (-a * (theta - b)).exp())
}

/// Fisher information I(θ) = a² P (1 - P)
pub fn information(a: f64, b: f64, theta: f64) -> f64 {
  let p = probability(a, b, theta);
  a * a * p * (1.0 - p)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AbilityEstimate {
  pub theta: f64,
  pub standard_error: f64,
}

/// One answered item as seen by the likelihood.
#[derive(Clone, Copy, Debug)]
pub struct ItemResponse {
  pub discrimination: f64,
  pub difficulty: f64,
  /// Possibly fractional correctness u ∈ [0,1].
  pub response: f64,
}

#[derive(Clone, Debug)]
pub struct AbilityEstimator {
  bound: f64,
  prior_standard_error: f64,
  model: ResponseModel,
  pass_threshold: f64,
}

impl AbilityEstimator {
  pub fn new(engine: &EngineConfig, pass_threshold: f64) -> Self {
    Self {
      bound: engine.theta_bound,
      prior_standard_error: engine.prior_standard_error,
      model: engine.response_model,
      pass_threshold,
    }
  }

  /// θ = 0 (population average) with the configured prior SE.
  pub fn initial(&self) -> AbilityEstimate {
    AbilityEstimate { theta: 0.0, standard_error: self.prior_standard_error }
  }

  /// Map a scored correctness to the u used in the likelihood.
  pub fn response_value(&self, correctness: f64) -> f64 {
    let c = correctness.clamp(0.0, 1.0);
    match self.model {
      ResponseModel::Soft => c,
      ResponseModel::Dichotomous => {
        if c >= self.pass_threshold { 1.0 } else { 0.0 }
      }
    }
  }

  pub fn items_from(&self, responses: &[ScoredResponse]) -> Vec<ItemResponse> {
    responses
      .iter()
      .map(|r| ItemResponse {
        discrimination: r.discrimination,
        difficulty: r.difficulty,
        response: self.response_value(r.correctness),
      })
      .collect()
  }

  /// θ_new = θ_old + Σ aᵢ(uᵢ - Pᵢ) / Σ aᵢ²Pᵢ(1-Pᵢ), SE = 1/√Σ aᵢ²Pᵢ(1-Pᵢ),
  /// both evaluated at θ_old. θ is clamped to [-bound, bound].
  pub fn update(&self, current: AbilityEstimate, items: &[ItemResponse]) -> AbilityEstimate {
    let theta_old = current.theta.clamp(-self.bound, self.bound);
    let mut score = 0.0;
    let mut info = 0.0;
    for item in items {
      let p = probability(item.discrimination, item.difficulty, theta_old);
      score += item.discrimination * (item.response - p);
      info += item.discrimination * item.discrimination * p * (1.0 - p);
    }

    // Saturated logistic terms can drive information to 0; keep θ and the prior SE.
    if !(info.is_finite() && info > f64::EPSILON) {
      return AbilityEstimate {
        theta: theta_old,
        standard_error: if items.is_empty() { self.prior_standard_error } else { current.standard_error },
      };
    }

    let theta = (theta_old + score / info).clamp(-self.bound, self.bound);
    AbilityEstimate { theta, standard_error: 1.0 / info.sqrt() }
  }
}
