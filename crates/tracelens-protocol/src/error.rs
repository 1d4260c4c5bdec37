//! Error types for tracelens.

use thiserror::Error;

/// Errors surfaced by the tracelens contract and its adapters.
///
/// Malformed events are never an error: the compiler degrades them instead.
#[derive(Debug, Error)]
pub enum LensError {
    #[error("invalid replay speed: {0}")]
    InvalidSpeed(f64),
    #[error("run not found: {0}")]
    RunNotFound(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("sequence conflict: expected {expected}, got {actual}")]
    SequenceConflict { expected: u64, actual: u64 },
}

/// Convenience result type for tracelens operations.
pub type LensResult<T> = Result<T, LensError>;
