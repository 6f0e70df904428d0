//! Builder error types

use sessionstore::StoreError;
use thiserror::Error;

use super::Stage;
use crate::extract::ExtractError;
use crate::package::PackageError;
use crate::planning::PlanError;

#[derive(Debug, Error)]
pub enum BuilderError {
    #[error("{0}")]
    ExtractionFailed(#[from] ExtractError),

    #[error("{0}")]
    PlanGenerationFailed(#[from] PlanError),

    #[error("Cannot {operation} while session is {stage}")]
    InvalidStage { operation: &'static str, stage: Stage },

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("No packaged artifact for session {0}")]
    ArtifactNotFound(String),

    #[error("Build run {run} does not belong to the current build of this session")]
    ForeignRun { run: u64 },

    #[error("Session store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Packaging(#[from] PackageError),
}

impl BuilderError {
    pub(crate) fn invalid_stage(operation: &'static str, stage: Stage) -> Self {
        BuilderError::InvalidStage { operation, stage }
    }
}
