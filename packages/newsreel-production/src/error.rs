use crate::job::StageId;
use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, ProductionError>;

#[derive(Error, Debug)]
pub enum ProductionError {
    /// Missing or inconsistent caller input; the job never leaves Created.
    #[error("Validation error: {0}")]
    Validation(String),

    /// External generation failed (timeout, malformed payload, provider
    /// error). The current stage aborts and the job goes to Failed.
    #[error("Generation failed: {0}")]
    Generation(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] newsreel_storage::StorageError),

    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Stage {stage} timed out after {timeout_ms}ms")]
    Timeout { stage: StageId, timeout_ms: u64 },

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Stage execution failed: {0}")]
    StageExecutionFailed(String),

    #[error("Missing artifact for stage {0}")]
    MissingArtifact(StageId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("No checkpoint found for job {0}")]
    CheckpointNotFound(Uuid),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ProductionError {
    pub fn validation<E: std::fmt::Display>(e: E) -> Self {
        Self::Validation(e.to_string())
    }

    pub fn generation<E: std::fmt::Display>(e: E) -> Self {
        Self::Generation(e.to_string())
    }

    pub fn serialization<E: std::fmt::Display>(e: E) -> Self {
        Self::Serialization(e.to_string())
    }

    pub fn parse<E: std::fmt::Display>(e: E) -> Self {
        Self::Parse(e.to_string())
    }

    /// Stage-level failures that send a job to Failed while keeping the
    /// artifacts of stages that already checkpointed.
    pub fn is_stage_failure(&self) -> bool {
        matches!(
            self,
            ProductionError::Generation(_)
                | ProductionError::Timeout { .. }
                | ProductionError::Cancelled(_)
                | ProductionError::StageExecutionFailed(_)
                | ProductionError::MissingArtifact(_)
        )
    }
}

impl From<serde_json::Error> for ProductionError {
    fn from(err: serde_json::Error) -> Self {
        ProductionError::Serialization(err.to_string())
    }
}
