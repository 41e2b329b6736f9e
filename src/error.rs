//! Error types for gene set variance analysis.

use thiserror::Error;

/// Unified error type for all geseca operations.
#[derive(Debug, Error)]
pub enum GesecaError {
    /// I/O error while reading inputs or writing the result table.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed matrix or gene set file.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid input (bad arguments, inconsistent shapes, non-finite values).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Scaling was requested for a row whose variance is zero.
    #[error("cannot scale gene '{gene}' to unit variance: row is constant")]
    ZeroVarianceRow { gene: String },

    /// A numerical routine rejected its parameters.
    #[error("numeric error: {0}")]
    Numeric(String),

    /// The dedicated worker pool could not be created.
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl From<csv::Error> for GesecaError {
    fn from(err: csv::Error) -> Self {
        GesecaError::Parse(err.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, GesecaError>;
