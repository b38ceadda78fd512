//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid UID: {0}")]
    InvalidUid(String),

    #[error("invalid partition name: {0}")]
    InvalidPartitionName(String),

    #[error("invalid tag path: {0}")]
    InvalidTagPath(String),

    #[error("invalid value representation: {0}")]
    InvalidVr(String),

    #[error("unknown validation error code: {0}")]
    UnknownErrorCode(i64),

    #[error("unknown instance status: {0}")]
    UnknownStatus(String),

    #[error("unknown query tag level: {0}")]
    UnknownLevel(String),

    #[error("unknown query status: {0}")]
    UnknownQueryStatus(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
