//! Instance index repository.

use crate::error::IndexResult;
use crate::models::{CascadeOutcome, InstanceRow, WatermarkRange};
use async_trait::async_trait;
use gantry_core::{InstanceIdentifier, InstanceStatus, VersionedInstanceIdentifier};
use time::OffsetDateTime;

/// Repository for instance index operations.
///
/// Every mutation runs as a single transaction; watermark allocation happens
/// inside the creating transaction so watermarks are strictly increasing and
/// never reused.
#[async_trait]
pub trait InstanceRepo: Send + Sync {
    /// Allocate a fresh watermark and insert the instance in the `Creating`
    /// state. Fails with `InstanceAlreadyExists` when a non-deleted row for
    /// the same identity is present; concurrent creators for one identity
    /// resolve to exactly one winner.
    async fn begin_create_instance(
        &self,
        identifier: &InstanceIdentifier,
        transfer_syntax_uid: Option<&str>,
        has_frame_metadata: bool,
        created_at: OffsetDateTime,
    ) -> IndexResult<i64>;

    /// Transition the `Creating` row to `Created`. Must be called with the
    /// exact watermark returned by `begin_create_instance`; fails with
    /// `InstanceNotFound` otherwise (e.g. concurrent deletion).
    async fn end_create_instance(
        &self,
        identifier: &InstanceIdentifier,
        watermark: i64,
    ) -> IndexResult<()>;

    /// Get a `Created` instance row. Fails with `InstanceNotFound` if absent.
    async fn get_instance(&self, identifier: &InstanceIdentifier) -> IndexResult<InstanceRow>;

    /// Hierarchical lookup filtered to `Created` status, ordered by
    /// ascending watermark. A SOP filter requires a series filter. Returns
    /// an empty list (not an error) when nothing matches.
    async fn get_instance_identifiers(
        &self,
        partition_key: i64,
        study_instance_uid: &str,
        series_instance_uid: Option<&str>,
        sop_instance_uid: Option<&str>,
    ) -> IndexResult<Vec<VersionedInstanceIdentifier>>;

    /// Partition the watermark space (bounded above by `max_watermark` when
    /// given) into up to `batch_count` contiguous, non-overlapping ranges
    /// covering at most `batch_size` watermarks each, ordered ascending.
    ///
    /// Operates on a bounded snapshot of the watermark column; safe to call
    /// against a live, mutating table without locks.
    async fn get_instance_batches(
        &self,
        batch_size: u32,
        batch_count: u32,
        status: InstanceStatus,
        max_watermark: Option<i64>,
    ) -> IndexResult<Vec<WatermarkRange>>;

    /// Soft-delete one instance and cascade its error rows. Idempotent:
    /// deleting an absent or already-deleted instance yields a zero outcome.
    async fn delete_instance(&self, identifier: &InstanceIdentifier)
        -> IndexResult<CascadeOutcome>;

    /// Soft-delete every instance in a series and cascade their error rows.
    async fn delete_series(
        &self,
        partition_key: i64,
        study_instance_uid: &str,
        series_instance_uid: &str,
    ) -> IndexResult<CascadeOutcome>;

    /// Soft-delete every instance in a study and cascade their error rows.
    async fn delete_study(
        &self,
        partition_key: i64,
        study_instance_uid: &str,
    ) -> IndexResult<CascadeOutcome>;

    /// Allocate a fresh watermark for an in-place update and record it as
    /// the staged `new_watermark`. The instance keeps serving its current
    /// watermark until the update is completed.
    async fn stage_instance_update(&self, identifier: &InstanceIdentifier) -> IndexResult<i64>;

    /// Promote the staged watermark to the live one. The pre-update
    /// watermark is remembered as `original_watermark` on first promotion.
    /// Fails with `InvalidStateTransition` when no update is staged.
    async fn complete_instance_update(&self, identifier: &InstanceIdentifier) -> IndexResult<()>;

    /// Hard-delete soft-deleted instances past their retention window, up to
    /// `limit` rows, returning the purged identifiers. Their error rows were
    /// already removed when the soft delete cascaded.
    async fn purge_deleted_instances(
        &self,
        older_than: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<VersionedInstanceIdentifier>>;
}
