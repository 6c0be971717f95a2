//! Application state shared by the HTTP and WebSocket handlers.
//!
//! This module owns the wiring only:
//!   - the TOML config (or built-in defaults)
//!   - the rubric store seeded from the config bank
//!   - the optional flag-alert notifier
//!   - the wall clock
//!
//! All behavior lives in `VivaEngine`.

use std::sync::Arc;

use tracing::{info, instrument};

use crate::clock::{Clock, SystemClock};
use crate::config::{load_viva_config_from_env, VivaConfig};
use crate::notify::Notifier;
use crate::rubrics::RubricStore;
use crate::session::VivaEngine;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<VivaEngine>,
}

impl AppState {
    /// Build state from env: load config, seed rubrics, init the notifier.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let config = load_viva_config_from_env().unwrap_or_default();
        let notifier = Notifier::from_env();
        info!(target: "viva_backend", notifier = notifier.is_some(), "Flag alert notifier");
        Self::with_parts(config, notifier, Arc::new(SystemClock))
    }

    /// Explicit wiring, used by tests and embedders.
    pub fn with_parts(config: VivaConfig, notifier: Option<Notifier>, clock: Arc<dyn Clock>) -> Self {
        let rubrics = Arc::new(RubricStore::from_bank(&config.rubrics));
        let engine = VivaEngine::new(config, rubrics, notifier, clock);
        Self { engine: Arc::new(engine) }
    }
}
