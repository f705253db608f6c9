//! Unified error type for taskledger.
//!
//! Chain-integrity findings are deliberately NOT errors: they are reported as
//! data by [`crate::chain::verify_chain_integrity`]. Likewise a task that does
//! not satisfy its closure policy is a "not eligible" result, never an error.
//! Everything here is either bad input, an infrastructure failure, or a
//! concurrency conflict the caller may retry.

use thiserror::Error;

/// All taskledger errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Entity not found (job, workspace, event)
    #[error("not found: {0}")]
    NotFound(String),

    /// Caller supplied an invalid argument (empty id, non-object payload, bad config)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Chain append raced with another writer
    ///
    /// The stated `prev_hash` no longer matches the workspace tip. Re-reading
    /// the tip and appending again is safe.
    #[error("append conflict in workspace {workspace}: expected tip {expected}, found {actual}")]
    Conflict {
        /// Workspace whose chain was contended
        workspace: String,
        /// Tip the writer based its event on
        expected: String,
        /// Tip actually found in the store
        actual: String,
    },

    /// Storage backend failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Persisted data could not be decoded or failed its checksum
    #[error("corruption: {0}")]
    Corruption(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Job queue unavailable or rejected the operation
    #[error("job queue error: {0}")]
    Queue(String),

    /// Internal error (bug or invariant violation)
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for taskledger operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error is retryable.
    ///
    /// Conflicts succeed on retry with a fresh tip; queue errors are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. } | Error::Queue(_))
    }

    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is an append conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }

    /// Check if this is a serious/unrecoverable error.
    pub fn is_serious(&self) -> bool {
        matches!(self, Error::Internal(_) | Error::Corruption(_))
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::InvalidInput(format!("config: {}", e))
    }
}
