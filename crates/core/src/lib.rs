//! Core domain types and shared logic for the gantry imaging archive.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Instance identity (partition key + study/series/SOP UID triple)
//! - Instance lifecycle status and watermark versioning
//! - Extended query tag paths, value representations, and levels
//! - Attribute validation error codes
//! - Index store configuration

pub mod config;
pub mod error;
pub mod error_code;
pub mod identifier;
pub mod status;
pub mod tag;

pub use config::{IndexConfig, IndexingConfig};
pub use error::{Error, Result};
pub use error_code::ValidationErrorCode;
pub use identifier::{InstanceIdentifier, VersionedInstanceIdentifier};
pub use status::InstanceStatus;
pub use tag::{
    AddExtendedQueryTagEntry, ExtendedQueryTagStoreEntry, QueryStatus, QueryTagLevel, TagPath,
    TagVr,
};

/// Key of the well-known default partition, seeded at schema creation.
pub const DEFAULT_PARTITION_KEY: i64 = 1;

/// Reserved name of the well-known default partition.
pub const DEFAULT_PARTITION_NAME: &str = "default";

/// Maximum length of a partition name.
pub const MAX_PARTITION_NAME_LENGTH: usize = 64;

/// Maximum length of a DICOM UID.
pub const MAX_UID_LENGTH: usize = 64;
