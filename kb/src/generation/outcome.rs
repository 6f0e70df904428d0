//! Per-unit results and the messages workers report them with

use std::time::Duration;
use thiserror::Error;

use crate::domain::GeneratedUnit;

/// Why a unit, or part of it, was not generated
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UnitError {
    #[error("Narrative generation failed: {0}")]
    NarrativeFailed(String),

    #[error("Artifact generation failed: {0}")]
    ArtifactFailed(String),

    #[error("{step} generation timed out after {after:?}")]
    Timeout { step: &'static str, after: Duration },

    #[error("Cancelled while generating")]
    Cancelled,

    #[error("Not started: build was cancelled")]
    NotStarted,

    #[error("Generation task panicked: {0}")]
    Panicked(String),
}

impl UnitError {
    /// True for errors caused by cancelling the build rather than by generation
    pub fn is_cancellation(&self) -> bool {
        matches!(self, UnitError::Cancelled | UnitError::NotStarted)
    }
}

/// Terminal result for one unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Narrative and at least one artifact
    Complete(GeneratedUnit),
    /// Narrative only; artifact generation failed
    Degraded { unit: GeneratedUnit, error: UnitError },
    /// Nothing usable
    Failed { unit_id: String, error: UnitError },
}

impl UnitOutcome {
    pub fn unit_id(&self) -> &str {
        match self {
            UnitOutcome::Complete(unit) => &unit.unit_id,
            UnitOutcome::Degraded { unit, .. } => &unit.unit_id,
            UnitOutcome::Failed { unit_id, .. } => unit_id,
        }
    }

    pub fn error(&self) -> Option<&UnitError> {
        match self {
            UnitOutcome::Complete(_) => None,
            UnitOutcome::Degraded { error, .. } | UnitOutcome::Failed { error, .. } => Some(error),
        }
    }
}

/// Progress reported by generation workers, in per-unit order
#[derive(Debug, Clone)]
pub enum UnitMessage {
    /// A worker picked the unit up
    Started {
        index: usize,
        total: usize,
        unit_id: String,
        unit_name: String,
    },
    /// The unit reached its terminal outcome
    Finished {
        index: usize,
        total: usize,
        unit_name: String,
        outcome: UnitOutcome,
    },
}
