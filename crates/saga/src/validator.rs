//! Cross-backend consistency validation.
//!
//! Pure functions of the saga context, no I/O, so verdicts are
//! deterministic and independently testable. The read-backs feeding
//! `persisted_hash` happen in the finalize steps, before validation.

use backends::BackendKind;
use serde::Serialize;

use crate::context::SagaContext;

/// One named agreement check.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationCheck {
    pub name: &'static str,
    pub passed: bool,
    pub detail: Option<String>,
}

impl ValidationCheck {
    fn passed(name: &'static str) -> Self {
        Self {
            name,
            passed: true,
            detail: None,
        }
    }

    fn failed(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed: false,
            detail: Some(detail.into()),
        }
    }
}

/// The validator's verdict for one saga run. Produced once, attached to
/// the final result, never mutated afterward.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    pub overall_valid: bool,
    pub checks: Vec<ValidationCheck>,
    /// Composite score in `[0, 1]`: check pass-ratio weighted 0.7,
    /// backend coverage (non-skipped successes out of four) weighted 0.3.
    pub quality_score: f64,
}

impl ValidationResult {
    fn from_checks(checks: Vec<ValidationCheck>, coverage: f64) -> Self {
        let total = checks.len() as f64;
        let passed = checks.iter().filter(|c| c.passed).count() as f64;
        let pass_ratio = if total > 0.0 { passed / total } else { 1.0 };
        Self {
            overall_valid: checks.iter().all(|c| c.passed),
            checks,
            quality_score: 0.7 * pass_ratio + 0.3 * coverage,
        }
    }

    /// Concatenated details of the failed checks, for error messages.
    pub fn failure_summary(&self) -> String {
        self.checks
            .iter()
            .filter(|c| !c.passed)
            .map(|c| match &c.detail {
                Some(detail) => format!("{}: {}", c.name, detail),
                None => c.name.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validates that all backends agree after a saga's writes.
pub struct ConsistencyValidator;

impl ConsistencyValidator {
    /// Checks after a create or update saga:
    /// hash agreement between the relational row and the digest computed
    /// at step 1, record IDs present for every non-skipped backend, no
    /// hard backend errors, and a successful relational outcome.
    pub fn validate(ctx: &SagaContext) -> ValidationResult {
        let mut checks = Vec::new();

        checks.push(match (&ctx.file_hash, &ctx.persisted_hash) {
            (Some(computed), Some(persisted)) if computed == persisted => {
                ValidationCheck::passed("hash_agreement")
            }
            (Some(computed), Some(persisted)) => ValidationCheck::failed(
                "hash_agreement",
                format!("computed {computed} but relational row has {persisted}"),
            ),
            (Some(_), None) => {
                ValidationCheck::failed("hash_agreement", "relational row missing on read-back")
            }
            (None, _) => ValidationCheck::failed("hash_agreement", "content hash never computed"),
        });

        let missing_ids: Vec<&str> = ctx
            .backend_results()
            .iter()
            .filter(|(_, o)| o.success && !o.skipped && o.record_id.is_none())
            .map(|(kind, _)| kind.as_str())
            .collect();
        checks.push(if missing_ids.is_empty() {
            ValidationCheck::passed("record_ids_present")
        } else {
            ValidationCheck::failed(
                "record_ids_present",
                format!("no record id from: {}", missing_ids.join(", ")),
            )
        });

        checks.push(Self::no_backend_errors(ctx));

        checks.push(
            match ctx.outcome(BackendKind::Relational) {
                Some(o) if o.success && !o.skipped => ValidationCheck::passed("relational_present"),
                Some(_) => ValidationCheck::failed(
                    "relational_present",
                    "system of record did not complete the write",
                ),
                None => ValidationCheck::failed(
                    "relational_present",
                    "system of record was never written",
                ),
            },
        );

        ValidationResult::from_checks(checks, Self::coverage(ctx))
    }

    /// Checks after a delete saga: no hard backend errors and the
    /// relational row gone on read-back.
    pub fn validate_removal(ctx: &SagaContext) -> ValidationResult {
        let mut checks = vec![Self::no_backend_errors(ctx)];

        checks.push(if ctx.persisted_hash.is_none() {
            ValidationCheck::passed("relational_row_removed")
        } else {
            ValidationCheck::failed(
                "relational_row_removed",
                "relational row still present after delete",
            )
        });

        ValidationResult::from_checks(checks, Self::coverage(ctx))
    }

    fn no_backend_errors(ctx: &SagaContext) -> ValidationCheck {
        let failed: Vec<&str> = ctx
            .backend_results()
            .iter()
            .filter(|(_, o)| !o.success)
            .map(|(kind, _)| kind.as_str())
            .collect();
        if failed.is_empty() {
            ValidationCheck::passed("no_backend_errors")
        } else {
            ValidationCheck::failed(
                "no_backend_errors",
                format!("hard errors from: {}", failed.join(", ")),
            )
        }
    }

    /// Fraction of the four backends that completed without skipping.
    fn coverage(ctx: &SagaContext) -> f64 {
        let participating = BackendKind::ALL
            .iter()
            .filter(|kind| {
                ctx.outcome(**kind)
                    .is_some_and(|o| o.success && !o.skipped)
            })
            .count();
        participating as f64 / BackendKind::ALL.len() as f64
    }
}
