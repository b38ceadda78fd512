//! Extended query tag catalog repository.

use crate::error::IndexResult;
use crate::models::ExtendedQueryTagRow;
use async_trait::async_trait;
use gantry_core::{AddExtendedQueryTagEntry, ExtendedQueryTagStoreEntry, TagPath, TagVr};
use time::OffsetDateTime;

/// Repository for the extended query tag catalog.
///
/// `query_status` and `error_count` are mutated only by the error store's
/// accounting rules, never through this trait.
#[async_trait]
pub trait ExtendedQueryTagRepo: Send + Sync {
    /// Atomically register all entries or none. Fails with
    /// `ExtendedQueryTagCountExceeded` when the resulting total would exceed
    /// `max_allowed_count` and `ExtendedQueryTagAlreadyExists` on a path
    /// collision. New tags start enabled with a zero error count.
    async fn add_extended_query_tags(
        &self,
        entries: &[AddExtendedQueryTagEntry],
        max_allowed_count: usize,
        created_at: OffsetDateTime,
    ) -> IndexResult<Vec<ExtendedQueryTagStoreEntry>>;

    /// Get a tag by path. Fails with `ExtendedQueryTagNotFound` if no tag is
    /// registered at that path.
    async fn get_extended_query_tag(&self, path: &TagPath) -> IndexResult<ExtendedQueryTagRow>;

    /// Paged catalog listing ordered by tag key.
    async fn list_extended_query_tags(
        &self,
        limit: u32,
        offset: u32,
    ) -> IndexResult<Vec<ExtendedQueryTagRow>>;

    /// Delete a tag and cascade-delete all its error rows in one
    /// transaction, returning the number of error rows removed. Fails with
    /// `ExtendedQueryTagNotFound` when the path is absent or the VR does not
    /// match the registered tag.
    async fn delete_extended_query_tag(&self, path: &TagPath, vr: &TagVr) -> IndexResult<u64>;
}
