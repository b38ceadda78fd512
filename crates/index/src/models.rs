//! Database models mapping to the index schema.

use gantry_core::{
    InstanceIdentifier, InstanceStatus, QueryStatus, QueryTagLevel, ValidationErrorCode,
    VersionedInstanceIdentifier,
};
use sqlx::FromRow;
use time::OffsetDateTime;

// =============================================================================
// Partitions
// =============================================================================

/// Partition record for tenant isolation.
#[derive(Debug, Clone, FromRow)]
pub struct PartitionRow {
    pub partition_key: i64,
    pub partition_name: String,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Instance index
// =============================================================================

/// Instance index record.
///
/// `watermark` is the live version; `original_watermark` remembers the
/// version before the first in-place update and `new_watermark` holds a
/// staged update's version until it is promoted.
#[derive(Debug, Clone, FromRow)]
pub struct InstanceRow {
    pub partition_key: i64,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
    pub watermark: i64,
    pub status: String,
    pub transfer_syntax_uid: Option<String>,
    pub has_frame_metadata: bool,
    pub original_watermark: Option<i64>,
    pub new_watermark: Option<i64>,
    pub created_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl InstanceRow {
    /// Parse the stored status string.
    pub fn status(&self) -> gantry_core::Result<InstanceStatus> {
        self.status.parse()
    }

    /// Reconstruct the typed identity from the row.
    pub fn identifier(&self) -> gantry_core::Result<InstanceIdentifier> {
        InstanceIdentifier::new(
            self.partition_key,
            self.study_instance_uid.clone(),
            self.series_instance_uid.clone(),
            self.sop_instance_uid.clone(),
        )
    }

    /// Identity plus the live watermark.
    pub fn versioned_identifier(&self) -> gantry_core::Result<VersionedInstanceIdentifier> {
        Ok(VersionedInstanceIdentifier {
            identifier: self.identifier()?,
            watermark: self.watermark,
        })
    }
}

// =============================================================================
// Extended query tag catalog
// =============================================================================

/// Extended query tag catalog record.
#[derive(Debug, Clone, FromRow)]
pub struct ExtendedQueryTagRow {
    pub tag_key: i64,
    pub tag_path: String,
    pub tag_vr: String,
    pub tag_level: String,
    pub query_status: String,
    pub error_count: i64,
    pub created_at: OffsetDateTime,
}

impl ExtendedQueryTagRow {
    /// Parse the stored query status string.
    pub fn query_status(&self) -> gantry_core::Result<QueryStatus> {
        self.query_status.parse()
    }

    /// Parse the stored level string.
    pub fn level(&self) -> gantry_core::Result<QueryTagLevel> {
        self.tag_level.parse()
    }
}

// =============================================================================
// Extended query tag errors
// =============================================================================

/// Raw tag error record.
#[derive(Debug, Clone, FromRow)]
pub struct TagErrorRow {
    pub tag_key: i64,
    pub watermark: i64,
    pub error_code: i64,
    pub created_at: OffsetDateTime,
}

/// Tag error joined against the owning instance's identity.
#[derive(Debug, Clone, FromRow)]
pub struct TagErrorDetailRow {
    pub tag_key: i64,
    pub watermark: i64,
    pub error_code: i64,
    pub created_at: OffsetDateTime,
    pub partition_key: i64,
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub sop_instance_uid: String,
}

impl TagErrorDetailRow {
    /// Parse the stored error code.
    pub fn error_code(&self) -> gantry_core::Result<ValidationErrorCode> {
        ValidationErrorCode::try_from(self.error_code)
    }
}

// =============================================================================
// Batch enumeration and cascade accounting
// =============================================================================

/// A contiguous, inclusive `[start, end]` interval of watermarks used to
/// batch background scans without locking the whole index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatermarkRange {
    pub start: i64,
    pub end: i64,
}

/// Statistics from a cascading deletion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CascadeOutcome {
    /// Instance rows transitioned to the deleted status.
    pub instances_deleted: u64,
    /// Error rows hard-deleted.
    pub errors_deleted: u64,
    /// Distinct tags whose error_count was decremented.
    pub tags_affected: u64,
}
