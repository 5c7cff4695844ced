use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// All errors produced by the CGM Trace crates.
///
/// Row-level parse failures during ingestion are deliberately absent: bad
/// rows are counted and dropped, never surfaced as errors.
#[derive(Error, Debug)]
pub enum CgmError {
    /// The upload could not be read as delimited tabular text at all.
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// A recommendation was requested for a user with no stored readings.
    #[error("No glucose points found for user {0}")]
    NoData(String),

    /// The prediction method name is not one of the recognised methods.
    #[error("Unknown method: {0}")]
    UnknownMethod(String),

    /// An ingest start/end bound string could not be parsed as an instant.
    #[error("Invalid time bound: {0}")]
    InvalidBound(String),

    /// The requested glucose range is inverted or not finite.
    #[error("Invalid glucose range: lower {lower} > upper {upper}")]
    InvalidRange { lower: f64, upper: f64 },

    /// A lookback of zero readings was requested.
    #[error("Invalid lookback: {0} (must be at least 1)")]
    InvalidLookback(usize),

    /// A query limit of zero records was requested.
    #[error("Invalid limit: {0} (must be at least 1)")]
    InvalidLimit(usize),

    /// The user identifier is empty or cannot be used as a store key.
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),

    /// The store accepted fewer records than it was given.
    #[error("Partial write: expected {expected} records, stored {actual}")]
    PartialWrite { expected: usize, actual: usize },

    /// A store file could not be opened or read from disk.
    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A store file could not be opened for appending or written.
    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation exceeded its deadline.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A blocking worker task panicked or was cancelled.
    #[error("Background task failed: {0}")]
    Task(String),

    /// A JSON document could not be parsed or written.
    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// Pass-through for any raw I/O error that does not carry a path.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the CGM Trace crates.
pub type Result<T> = std::result::Result<T, CgmError>;
