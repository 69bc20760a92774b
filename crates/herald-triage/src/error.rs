//! Error types for triage, ingestion and action execution.

use herald_core::error::HeraldError;
use herald_core::types::ItemState;
use uuid::Uuid;

/// Errors surfaced by the triage engine and the state transition manager.
#[derive(Debug, thiserror::Error)]
pub enum TriageError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    NotFound(Uuid),
    #[error("Item {internal_id} is already {state}")]
    AlreadyTerminal { internal_id: Uuid, state: ItemState },
    #[error("Action executor failed: {0}")]
    ExecutorFailure(#[source] ExecutorError),
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<HeraldError> for TriageError {
    fn from(err: HeraldError) -> Self {
        match err {
            HeraldError::Validation(msg) => TriageError::Validation(msg),
            other => TriageError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Errors from an action executor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutorError {
    #[error("{0}")]
    Failed(String),
    #[error("Action execution timed out after {0} seconds")]
    Timeout(u64),
    #[error("Payload rejected by executor: {0}")]
    InvalidPayload(String),
}

/// Errors from a content source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Content source unavailable: {0}")]
    Unavailable(String),
    #[error("Malformed feed: {0}")]
    Malformed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(err.to_string())
    }
}
