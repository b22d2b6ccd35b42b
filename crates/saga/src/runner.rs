//! Saga engine: sequential step execution with reverse-order rollback.

use crate::context::SagaContext;
use crate::error::{SagaError, Severity};
use crate::state::SagaState;
use crate::step::{SagaStep, StepOutcome};

/// Result of one saga run.
#[derive(Debug)]
pub struct SagaReport {
    pub state: SagaState,
    /// Name of the step whose hard failure aborted the saga, if any.
    pub failed_step: Option<&'static str>,
    /// The originating error, preserved across compensation.
    pub error: Option<SagaError>,
    /// Names of steps whose actions completed (skipped ones included).
    pub completed_steps: Vec<&'static str>,
}

impl SagaReport {
    /// True when every step completed and the saga finalized.
    pub fn success(&self) -> bool {
        self.state == SagaState::Completed
    }
}

/// Executes an ordered list of steps against one context.
///
/// Steps run strictly sequentially; concurrency, where desired, lives
/// inside a step's action. On a hard failure at step *k* the runner
/// compensates steps `1..k-1` in reverse order. Compensation errors are
/// never the primary failure reason; they are logged and accumulated
/// as warnings next to the original error.
pub struct SagaRunner {
    saga_type: &'static str,
}

impl SagaRunner {
    pub fn new(saga_type: &'static str) -> Self {
        Self { saga_type }
    }

    pub async fn execute(
        &self,
        steps: &[Box<dyn SagaStep>],
        ctx: &mut SagaContext,
    ) -> SagaReport {
        metrics::counter!("document_saga_executions_total", "saga_type" => self.saga_type)
            .increment(1);
        let start = std::time::Instant::now();
        ctx.state = SagaState::Running;

        let mut completed: Vec<usize> = Vec::new();
        let mut completed_names: Vec<&'static str> = Vec::new();

        for (i, step) in steps.iter().enumerate() {
            let name = step.name();
            tracing::info!(saga_type = self.saga_type, step = name, "saga step started");

            match step.action(ctx).await {
                Ok(StepOutcome::Completed) => {
                    completed.push(i);
                    completed_names.push(name);
                    tracing::info!(saga_type = self.saga_type, step = name, "saga step completed");
                }
                Ok(StepOutcome::Skipped) => {
                    // Counts as completed so its (no-op) compensation is
                    // still paired with the action.
                    completed.push(i);
                    completed_names.push(name);
                    tracing::warn!(saga_type = self.saga_type, step = name, "saga step skipped");
                }
                Err(err) if err.severity() == Severity::NonCritical => {
                    completed.push(i);
                    completed_names.push(name);
                    tracing::warn!(
                        saga_type = self.saga_type,
                        step = name,
                        error = %err,
                        "non-critical step failure, continuing"
                    );
                    ctx.push_warning(err.to_string());
                }
                Err(err) => {
                    tracing::warn!(
                        saga_type = self.saga_type,
                        step = name,
                        error = %err,
                        "saga step failed, compensating"
                    );
                    ctx.state = SagaState::Compensating;
                    self.rollback(steps, &completed, ctx).await;
                    ctx.state = SagaState::Failed;

                    metrics::counter!("document_saga_failed", "saga_type" => self.saga_type)
                        .increment(1);
                    metrics::histogram!("document_saga_duration_seconds")
                        .record(start.elapsed().as_secs_f64());

                    return SagaReport {
                        state: SagaState::Failed,
                        failed_step: Some(name),
                        error: Some(err),
                        completed_steps: completed_names,
                    };
                }
            }
        }

        ctx.state = SagaState::Completed;
        metrics::counter!("document_saga_completed", "saga_type" => self.saga_type).increment(1);
        metrics::histogram!("document_saga_duration_seconds")
            .record(start.elapsed().as_secs_f64());

        SagaReport {
            state: SagaState::Completed,
            failed_step: None,
            error: None,
            completed_steps: completed_names,
        }
    }

    /// Runs compensations for completed steps in strict reverse order.
    async fn rollback(
        &self,
        steps: &[Box<dyn SagaStep>],
        completed: &[usize],
        ctx: &mut SagaContext,
    ) {
        for &i in completed.iter().rev() {
            let step = &steps[i];
            let name = step.name();

            match step.compensate(ctx).await {
                Ok(()) => {
                    ctx.mark_compensated(name);
                    tracing::info!(
                        saga_type = self.saga_type,
                        step = name,
                        "compensation completed"
                    );
                }
                Err(err) => {
                    // Never escalated: the original failure stays primary.
                    let wrapped = SagaError::CompensationFailed {
                        step: name.to_string(),
                        reason: err.to_string(),
                    };
                    tracing::warn!(
                        saga_type = self.saga_type,
                        step = name,
                        error = %err,
                        "compensation failed"
                    );
                    metrics::counter!("document_saga_compensation_failures").increment(1);
                    ctx.push_warning(wrapped.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use backends::BackendKind;

    use super::*;
    use crate::step::StepOutcome;

    /// Records action/compensation invocations into a shared log.
    struct RecordingStep {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
        fail_compensation: bool,
        skip: bool,
        non_critical: bool,
    }

    impl RecordingStep {
        fn ok(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn SagaStep> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail: false,
                fail_compensation: false,
                skip: false,
                non_critical: false,
            })
        }

        fn failing(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn SagaStep> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail: true,
                fail_compensation: false,
                skip: false,
                non_critical: false,
            })
        }

        fn skipping(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn SagaStep> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail: false,
                fail_compensation: false,
                skip: true,
                non_critical: false,
            })
        }

        fn non_critical(name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> Box<dyn SagaStep> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail: false,
                fail_compensation: false,
                skip: false,
                non_critical: true,
            })
        }

        fn broken_compensation(
            name: &'static str,
            log: &Arc<Mutex<Vec<String>>>,
        ) -> Box<dyn SagaStep> {
            Box::new(Self {
                name,
                log: log.clone(),
                fail: false,
                fail_compensation: true,
                skip: false,
                non_critical: false,
            })
        }
    }

    #[async_trait]
    impl SagaStep for RecordingStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn action(&self, _ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
            self.log.lock().unwrap().push(format!("action:{}", self.name));
            if self.fail {
                return Err(SagaError::BackendOperationFailed {
                    backend: BackendKind::Relational,
                    reason: "boom".to_string(),
                });
            }
            if self.non_critical {
                return Err(SagaError::IdentityBindingFailed {
                    reason: "registry offline".to_string(),
                });
            }
            if self.skip {
                return Ok(StepOutcome::Skipped);
            }
            Ok(StepOutcome::Completed)
        }

        async fn compensate(&self, _ctx: &mut SagaContext) -> Result<(), SagaError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("compensate:{}", self.name));
            if self.fail_compensation {
                return Err(SagaError::BackendOperationFailed {
                    backend: BackendKind::Relational,
                    reason: "rollback boom".to_string(),
                });
            }
            Ok(())
        }
    }

    /// Logs the lifecycle state the context is in when the step runs.
    struct StateWatchingStep {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        fail: bool,
    }

    #[async_trait]
    impl SagaStep for StateWatchingStep {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn action(&self, ctx: &mut SagaContext) -> Result<StepOutcome, SagaError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("action:{}:{}", self.name, ctx.state));
            if self.fail {
                return Err(SagaError::BackendOperationFailed {
                    backend: BackendKind::Relational,
                    reason: "boom".to_string(),
                });
            }
            Ok(StepOutcome::Completed)
        }

        async fn compensate(&self, ctx: &mut SagaContext) -> Result<(), SagaError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("compensate:{}:{}", self.name, ctx.state));
            Ok(())
        }
    }

    fn ctx() -> SagaContext {
        SagaContext::default()
    }

    #[tokio::test]
    async fn test_all_steps_complete() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::ok("a", &log),
            RecordingStep::ok("b", &log),
            RecordingStep::ok("c", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert!(report.success());
        assert_eq!(report.completed_steps, vec!["a", "b", "c"]);
        assert!(report.error.is_none());
        assert_eq!(ctx.state, SagaState::Completed);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["action:a", "action:b", "action:c"]
        );
    }

    #[tokio::test]
    async fn test_lifecycle_states_are_tracked_through_the_run() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps: Vec<Box<dyn SagaStep>> = vec![
            Box::new(StateWatchingStep {
                name: "a",
                log: log.clone(),
                fail: false,
            }),
            Box::new(StateWatchingStep {
                name: "b",
                log: log.clone(),
                fail: true,
            }),
        ];
        let mut ctx = ctx();
        assert_eq!(ctx.state, SagaState::NotStarted);

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        // Forward steps see Running, compensations see Compensating, and
        // the run ends in a terminal state.
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "action:a:Running",
                "action:b:Running",
                "compensate:a:Compensating"
            ]
        );
        assert_eq!(ctx.state, SagaState::Failed);
        assert!(report.state.is_terminal());
    }

    #[tokio::test]
    async fn test_failure_compensates_in_reverse_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::ok("a", &log),
            RecordingStep::ok("b", &log),
            RecordingStep::failing("c", &log),
            RecordingStep::ok("d", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert!(!report.success());
        assert_eq!(report.state, SagaState::Failed);
        assert_eq!(report.failed_step, Some("c"));
        // d never ran; c is not compensated; a and b are, b first.
        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "action:a",
                "action:b",
                "action:c",
                "compensate:b",
                "compensate:a"
            ]
        );
        assert_eq!(ctx.compensated_steps(), &["b", "a"]);
    }

    #[tokio::test]
    async fn test_first_step_failure_compensates_nothing() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::failing("a", &log),
            RecordingStep::ok("b", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert!(!report.success());
        assert_eq!(*log.lock().unwrap(), vec!["action:a"]);
        assert!(ctx.compensated_steps().is_empty());
    }

    #[tokio::test]
    async fn test_skipped_step_does_not_abort() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::ok("a", &log),
            RecordingStep::skipping("b", &log),
            RecordingStep::ok("c", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert!(report.success());
        assert_eq!(report.completed_steps, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_non_critical_error_becomes_warning() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::ok("a", &log),
            RecordingStep::non_critical("bind", &log),
            RecordingStep::ok("c", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert!(report.success());
        assert_eq!(ctx.warnings().len(), 1);
        assert!(ctx.warnings()[0].contains("identity binding failed"));
    }

    #[tokio::test]
    async fn test_compensation_failure_is_not_primary_error() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::broken_compensation("a", &log),
            RecordingStep::failing("b", &log),
        ];
        let mut ctx = ctx();

        let report = SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert_eq!(report.failed_step, Some("b"));
        // Original error preserved.
        assert!(matches!(
            report.error,
            Some(SagaError::BackendOperationFailed { .. })
        ));
        // Compensation failure downgraded to a warning.
        assert_eq!(ctx.warnings().len(), 1);
        assert!(ctx.warnings()[0].contains("compensation for step 'a' failed"));
        // And the chain kept going (nothing left to compensate here, but
        // the failing compensation was attempted).
        assert_eq!(
            *log.lock().unwrap(),
            vec!["action:a", "action:b", "compensate:a"]
        );
    }

    #[tokio::test]
    async fn test_compensation_continues_past_a_failing_compensation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let steps = vec![
            RecordingStep::ok("a", &log),
            RecordingStep::broken_compensation("b", &log),
            RecordingStep::failing("c", &log),
        ];
        let mut ctx = ctx();

        SagaRunner::new("Test").execute(&steps, &mut ctx).await;

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "action:a",
                "action:b",
                "action:c",
                "compensate:b",
                "compensate:a"
            ]
        );
        // b's compensation failed but a's still ran and was recorded.
        assert_eq!(ctx.compensated_steps(), &["a"]);
    }
}
