//! Engine error type, composing the domain and storage taxonomies.

use procession_store::StoreError;
use procession_types::WorkflowError;

/// Errors surfaced by engine operations
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl EngineError {
    /// Whether the caller may simply retry the operation (currently
    /// only lock timeouts qualify)
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(err) if err.is_retryable())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
