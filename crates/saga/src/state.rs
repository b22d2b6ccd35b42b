//! Saga lifecycle states.

use serde::{Deserialize, Serialize};

/// Where a saga run is in its lifecycle.
///
/// ```text
/// NotStarted ──► Running ──┬──► Completed
///                          └──► Compensating ──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// No step has run yet.
    #[default]
    NotStarted,

    /// Forward steps are executing.
    Running,

    /// A step failed and completed steps are being rolled back.
    Compensating,

    /// Every step completed (terminal).
    Completed,

    /// Rollback finished after a failure (terminal).
    Failed,
}

impl SagaState {
    /// Returns true for terminal states.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Completed | SagaState::Failed)
    }

    /// Returns the state name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::NotStarted => "NotStarted",
            SagaState::Running => "Running",
            SagaState::Compensating => "Compensating",
            SagaState::Completed => "Completed",
            SagaState::Failed => "Failed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
