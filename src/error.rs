use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the partitioned store, the query layer and the calculators.
///
/// Missing data is never an error here: empty partitions read as empty results
/// and missing metric inputs become `None`. These variants cover I/O faults and
/// structural misuse only.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("CSV error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unknown partition kind: {0} (expected prices, quarterly or annual)")]
    UnknownKind(String),

    #[error("Unknown statement period: {0} (expected quarterly or annual)")]
    UnknownPeriod(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Invalid ticker: {0:?}")]
    InvalidTicker(String),

    #[error("Invalid metadata name: {0:?}")]
    InvalidMetadataName(String),

    #[error("Row for ticker {found} cannot be written to partition {expected}")]
    TickerMismatch { expected: String, found: String },

    #[error("No data available: {0}")]
    NoData(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StoreError::Io { path: path.into(), source }
    }

    pub(crate) fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        StoreError::Csv { path: path.into(), source }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
