//! Viva engine: adaptive oral assessment backend.
//!
//! A viva session asks a student questions drawn from a rubric, scores each
//! spoken answer, re-estimates ability under a 2PL IRT model and picks the
//! next question by maximum Fisher information until a stopping rule fires.
//! The terminal transition produces a final assessment, per-concept mastery
//! and review flags for instructors.
//!
//! Layout:
//! - `domain`, `config`, `seeds`, `rubrics`: data model, TOML config, rubric bank
//! - `irt`, `selector`, `assessor`, `mastery`, `outcome`, `review`: engine math
//! - `session`, `store`, `dashboard`: orchestration and read models
//! - `protocol`, `routes`, `state`, `telemetry`: HTTP/WS surface and wiring

pub mod assessor;
pub mod clock;
pub mod config;
pub mod dashboard;
pub mod domain;
pub mod error;
pub mod irt;
pub mod mastery;
pub mod notify;
pub mod outcome;
pub mod protocol;
pub mod review;
pub mod routes;
pub mod rubrics;
pub mod seeds;
pub mod selector;
pub mod session;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod util;

#[cfg(test)]
mod testing;

pub use error::{VivaError, VivaResult};
pub use routes::build_router;
pub use session::{AskedQuestion, NextStep, ResponseOutcome, VivaEngine};
pub use state::AppState;
