//! Engine error types.
//!
//! Errors are task-scoped: a failure here marks one upload task as failed
//! and is surfaced to the UI, it never aborts the batch or the hosting
//! application.

use thiserror::Error;

/// Pipeline step a transfer failure occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStep {
    Prepare,
    Transfer,
    Finalize,
}

impl std::fmt::Display for UploadStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStep::Prepare => write!(f, "prepare"),
            UploadStep::Transfer => write!(f, "transfer"),
            UploadStep::Finalize => write!(f, "finalize"),
        }
    }
}

/// Errors produced by the ingest engine.
#[derive(Debug, Error)]
pub enum IngestError {
    /// File or metadata rejected before any transfer began.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A backend call failed during prepare, transfer or finalize.
    #[error("{step} step failed: {source}")]
    Transfer {
        step: UploadStep,
        #[source]
        source: anyhow::Error,
    },

    /// Authoritative status could not be reconciled.
    #[error("reconciliation failed: {0}")]
    Reconciliation(String),

    /// No terminal processing state within the tracking window.
    ///
    /// Kept distinct from `Transfer` so the UI can tell a stalled pipeline
    /// apart from an explicit backend failure.
    #[error("document processing timed out after {0} seconds")]
    Timeout(u64),

    /// Retry requested after the retry budget was spent.
    #[error("upload retry limit reached")]
    RetriesExhausted,

    /// Operation not valid for the task's current state.
    #[error("{0}")]
    InvalidState(String),

    /// Unknown task id.
    #[error("no such upload task: {0}")]
    TaskNotFound(String),
}

impl IngestError {
    pub(crate) fn transfer(step: UploadStep, source: anyhow::Error) -> Self {
        Self::Transfer { step, source }
    }
}
