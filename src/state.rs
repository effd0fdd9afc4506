//! # Application State
//!
//! Shared state handed to every request handler. Everything here is
//! constructed exactly once at startup: the configuration is an immutable
//! snapshot, and the transcription service carries its own interior
//! synchronization (the inference gate), so the state itself is just a pair
//! of `Arc`s that are cheap to clone per worker.

use crate::config::AppConfig;
use crate::transcription::TranscriptionService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// Read-only configuration snapshot
    pub config: Arc<AppConfig>,
    /// The transcription pipeline (engine gate + cleanup client)
    pub service: Arc<TranscriptionService>,
}

impl AppState {
    pub fn new(config: AppConfig, service: Arc<TranscriptionService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }
}
