//! Index store error types.

use thiserror::Error;

/// Index store operation errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("partition '{0}' not found")]
    PartitionNotFound(String),

    #[error("instance {0} not found")]
    InstanceNotFound(String),

    #[error("instance {0} already exists")]
    InstanceAlreadyExists(String),

    #[error("extended query tag '{0}' not found")]
    ExtendedQueryTagNotFound(String),

    #[error("extended query tag '{0}' already exists")]
    ExtendedQueryTagAlreadyExists(String),

    #[error(
        "extended query tag limit exceeded: {current} registered + {adding} new > {max} allowed"
    )]
    ExtendedQueryTagCountExceeded {
        current: usize,
        adding: usize,
        max: usize,
    },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("domain error: {0}")]
    Domain(#[from] gantry_core::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<std::io::Error> for IndexError {
    fn from(e: std::io::Error) -> Self {
        IndexError::Config(e.to_string())
    }
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
