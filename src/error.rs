//! Crate-wide error type
//!
//! Every fallible engine operation returns [`Result`]. Variants map to the
//! failure classes callers can act on: missing entities, lost lock races,
//! malformed attempt data, and unreachable collaborators.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A learner, item, session, or activity lookup missed.
    #[error("not found: {0}")]
    NotFound(String),

    /// The per-learner write lock was not acquired within the retry budget.
    #[error("concurrent modification for learner {learner_id}: gave up after {attempts} lock attempts")]
    ConcurrentModification { learner_id: String, attempts: u32 },

    /// Attempt or session data failed validation.
    #[error("invalid outcome: {0}")]
    InvalidOutcome(String),

    /// A catalog or store collaborator is unreachable.
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),

    /// Database-level failure from the SQLite store.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure while preparing storage.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Error::InvalidOutcome(reason.into())
    }

    /// Whether retrying the failed operation can reasonably succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ConcurrentModification { .. } | Error::DependencyUnavailable(_) => true,
            Error::Storage(rusqlite::Error::SqliteFailure(e, _)) => matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}
