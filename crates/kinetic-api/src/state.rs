//! Application state.

use kinetic_worker::JobManager;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub jobs: JobManager,
}

impl AppState {
    pub fn new(config: ApiConfig, jobs: JobManager) -> Self {
        Self { config, jobs }
    }
}
