//! The atomic unit of saga work.

use async_trait::async_trait;

use crate::context::SagaContext;
use crate::error::SagaError;

/// How a step's action concluded without failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The action ran and wrote state.
    Completed,
    /// The action was skipped under the optional-backend policy. The
    /// saga continues; the step's compensation becomes a no-op.
    Skipped,
}

/// A named action/compensation pair operating on the shared context.
///
/// Actions signal hard failures by returning a [`SagaError`] with
/// [`Severity::Hard`](crate::error::Severity::Hard); non-critical errors
/// are downgraded to warnings by the runner. Compensations must be
/// idempotent: deleting an already-deleted record is not an error.
#[async_trait]
pub trait SagaStep: Send + Sync {
    /// Stable step name, used in logs, reports, and compensation markers.
    fn name(&self) -> &'static str;

    /// Runs the forward operation, reading and mutating the context.
    async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError>;

    /// Undoes the forward operation. Only invoked if `action` previously
    /// returned `Ok`; defaults to a no-op for terminal steps.
    async fn compensate(&self, _ctx: &mut SagaContext) -> Result<(), SagaError> {
        Ok(())
    }
}
