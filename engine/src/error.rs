//! Error types for the docsync engine.

use crate::RecordId;
use thiserror::Error;

/// All errors surfaced by the engine.
///
/// `MissingIdentifier` and `BatchWriteFailure` are recovered inside a sync run
/// and only show up in its counters; `StoreUnavailable` aborts the run.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("row has no usable identifier")]
    MissingIdentifier,

    #[error("bulk write of {attempted} documents failed: {message}")]
    BatchWriteFailure { attempted: usize, message: String },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid sync options: {0}")]
    InvalidOptions(String),
}

/// Failure reported by a [`DocumentStore`](crate::DocumentStore) backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store cannot be reached at all (connection, pool, protocol).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The store was reached but refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(msg) => Error::StoreUnavailable(msg),
            StoreError::Rejected(msg) => Error::StoreUnavailable(format!("request rejected: {msg}")),
        }
    }
}

/// A single operation that failed inside an otherwise applied bulk write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteError {
    /// Position of the operation in the submitted batch
    pub index: usize,
    /// Identifier of the document the operation targeted
    pub id: RecordId,
    pub message: String,
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
