//! Extended query tag error store repository.

use crate::error::IndexResult;
use crate::models::TagErrorDetailRow;
use async_trait::async_trait;
use gantry_core::{TagPath, ValidationErrorCode};
use time::OffsetDateTime;

/// Repository for per-tag, per-instance validation failures.
///
/// At most one error row is retained per `(tag_key, watermark)` pair;
/// recording a second error for the same pair overwrites the code without
/// touching the tag's error count.
#[async_trait]
pub trait TagErrorRepo: Send + Sync {
    /// Record a validation failure against a live tag. The first error for a
    /// `(tag_key, watermark)` pair increments the tag's `error_count` by
    /// exactly 1 and disables the tag's query eligibility; replays are
    /// last-write-wins for the code and never double count. Fails with
    /// `ExtendedQueryTagNotFound` when `tag_key` does not reference a live
    /// tag, and with `InstanceNotFound` when `watermark` does not belong to
    /// a non-deleted instance (a concurrent delete that commits first wins).
    async fn add_error(
        &self,
        tag_key: i64,
        error_code: ValidationErrorCode,
        watermark: i64,
        created_at: OffsetDateTime,
    ) -> IndexResult<()>;

    /// Paginated error listing for a registered tag path, ordered by
    /// ascending watermark and joined against the instance index for the
    /// owning identity. `limit` may exceed the remainder. Fails with
    /// `ExtendedQueryTagNotFound` when the path is unregistered, so a tag
    /// deleted mid-pagination is distinguishable from a tag with no errors.
    async fn get_errors(
        &self,
        path: &TagPath,
        limit: u32,
        offset: u32,
    ) -> IndexResult<Vec<TagErrorDetailRow>>;
}
