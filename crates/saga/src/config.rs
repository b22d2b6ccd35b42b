//! Orchestrator configuration.

use std::time::Duration;

/// Tunables for the document store, with sensible defaults.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Source system name passed to the identity service.
    pub source_system: String,
    /// Deadline applied to every backend call inside a step. `None`
    /// disables deadlines.
    pub step_timeout: Option<Duration>,
    /// Character count per embedding chunk handed to the vector backend.
    pub chunk_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            source_system: "polyglot".to_string(),
            step_timeout: Some(Duration::from_secs(30)),
            chunk_size: 1000,
        }
    }
}
