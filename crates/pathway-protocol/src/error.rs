//! Error types for the research session engine.
//!
//! Not-found is never an error here: lookups return `Option`.

use thiserror::Error;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum ResearchError {
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("session already exists for user {user_id}, chat {chat_id}")]
    SessionConflict { user_id: String, chat_id: String },
    #[error("session {session_id} was modified concurrently")]
    StaleSession { session_id: String },
    #[error("corrupt session {session_id}: {reason}")]
    CorruptSession { session_id: String, reason: String },
    #[error("invalid session transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
    #[error("checkpoint store error: {0}")]
    CheckpointStore(String),
    #[error("model client construction failed: {0}")]
    ClientConstruction(String),
    #[error("model invocation failed: {0}")]
    Invocation(String),
    #[error("model invocation timed out after {0}ms")]
    Timeout(u64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ResearchError {
    pub fn storage(error: impl std::fmt::Display) -> Self {
        Self::StorageUnavailable(error.to_string())
    }

    pub fn checkpoint_store(error: impl std::fmt::Display) -> Self {
        Self::CheckpointStore(error.to_string())
    }
}

/// Convenience result type for engine operations.
pub type ResearchResult<T> = Result<T, ResearchError>;
