use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by loading and clustering in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The workload has no entities or no observations.
    #[error("empty input")]
    EmptyInput,

    /// Invalid parameter value.
    #[error("invalid parameter {name}: {message}")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// Human-readable explanation.
        message: &'static str,
    },

    /// Reading an input file failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The CSV reader rejected an input file.
    #[error(transparent)]
    Csv(#[from] csv::Error),

    /// A record in an input file could not be interpreted.
    #[error("{}:{line}: {reason}", path.display())]
    MalformedRecord {
        /// File containing the record.
        path: PathBuf,
        /// 1-based record number.
        line: u64,
        /// What was wrong with it.
        reason: String,
    },

    /// Engine state became inconsistent. Runs abort on this; it is never recovered.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

/// Result type used by this crate.
pub type Result<T> = std::result::Result<T, Error>;
