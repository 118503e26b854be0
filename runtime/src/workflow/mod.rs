//! Audit workflow: the phase state machine and its outcomes.

pub mod conductor;

use crate::model::Phase;
use serde::Serialize;

pub use conductor::Conductor;

/// What one `advance` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    /// `from` finished and the audit now sits in `to`.
    Advanced { from: Phase, to: Phase },
    /// Questioning is blocked until every question is answered or skipped.
    AwaitingAnswers { pending: usize },
    Completed,
    /// The audit is failed. Nothing runs again until an explicit retry.
    Failed { phase: Phase, message: String },
}

impl StepOutcome {
    /// `true` when `run` should stop.
    pub fn is_settled(&self) -> bool {
        !matches!(self, StepOutcome::Advanced { .. })
    }
}
