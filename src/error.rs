//! Error taxonomy shared by the engine and the HTTP/WS surfaces.
//!
//! Numeric edge cases (empty item pool, θ pinned at a bound) are not errors:
//! the engine handles them by policy and still produces an assessment.

use axum::{
  http::StatusCode,
  response::{IntoResponse, Response},
  Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum VivaError {
  /// No ACTIVE rubric (or viva disabled) for the assignment. Session is not created.
  #[error("not configured: {0}")]
  NotConfigured(String),

  /// A non-terminal session already exists for this student and assignment.
  #[error("conflict: {0}")]
  Conflict(String),

  /// Operation is not valid for the session's current status.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// Another call is currently mutating the same session. Retry the single call.
  #[error("concurrent modification of session {0}")]
  ConcurrentModification(String),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("validation failed: {0}")]
  Validation(String),
}

pub type VivaResult<T> = Result<T, VivaError>;

impl VivaError {
  /// Machine-readable code used in error bodies and WS error messages.
  pub fn code(&self) -> &'static str {
    match self {
      VivaError::NotConfigured(_) => "not_configured",
      VivaError::Conflict(_) => "conflict",
      VivaError::InvalidState(_) => "invalid_state",
      VivaError::ConcurrentModification(_) => "concurrent_modification",
      VivaError::NotFound(_) => "not_found",
      VivaError::Validation(_) => "validation",
    }
  }

  pub fn status(&self) -> StatusCode {
    match self {
      VivaError::NotConfigured(_) => StatusCode::PRECONDITION_FAILED,
      VivaError::Conflict(_) => StatusCode::CONFLICT,
      VivaError::InvalidState(_) => StatusCode::CONFLICT,
      VivaError::ConcurrentModification(_) => StatusCode::LOCKED,
      VivaError::NotFound(_) => StatusCode::NOT_FOUND,
      VivaError::Validation(_) => StatusCode::BAD_REQUEST,
    }
  }
}

impl IntoResponse for VivaError {
  fn into_response(self) -> Response {
    let body = json!({ "error": self.code(), "message": self.to_string() });
    (self.status(), Json(body)).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_status_mapping() {
    assert_eq!(VivaError::Conflict("x".into()).status(), StatusCode::CONFLICT);
    assert_eq!(VivaError::ConcurrentModification("s".into()).status(), StatusCode::LOCKED);
    assert_eq!(VivaError::NotConfigured("a".into()).status(), StatusCode::PRECONDITION_FAILED);
    assert_eq!(VivaError::NotFound("s".into()).code(), "not_found");
  }
}
