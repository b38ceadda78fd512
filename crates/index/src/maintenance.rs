//! Policy layer applying configured indexing limits to store operations.

use crate::error::IndexResult;
use crate::store::IndexStore;
use gantry_core::{
    AddExtendedQueryTagEntry, ExtendedQueryTagStoreEntry, IndexingConfig,
    VersionedInstanceIdentifier,
};
use std::sync::Arc;
use time::OffsetDateTime;

/// Applies the configured indexing policy (catalog cap, deleted-instance
/// retention, purge batch size) to the corresponding store operations, so
/// callers hold one knob set instead of threading raw limits everywhere.
pub struct IndexMaintenance {
    store: Arc<dyn IndexStore>,
    config: IndexingConfig,
}

impl IndexMaintenance {
    pub fn new(store: Arc<dyn IndexStore>, config: IndexingConfig) -> Self {
        Self { store, config }
    }

    /// Register extended query tags under the configured catalog cap.
    pub async fn add_extended_query_tags(
        &self,
        entries: &[AddExtendedQueryTagEntry],
        created_at: OffsetDateTime,
    ) -> IndexResult<Vec<ExtendedQueryTagStoreEntry>> {
        self.store
            .add_extended_query_tags(entries, self.config.max_extended_query_tags, created_at)
            .await
    }

    /// Run one purge pass: hard-delete tombstones whose deletion predates
    /// the configured retention window, at most one batch worth. Returns the
    /// purged identifiers so callers can clean up dependent artifacts.
    pub async fn purge_deleted_instances(
        &self,
        now: OffsetDateTime,
    ) -> IndexResult<Vec<VersionedInstanceIdentifier>> {
        let cutoff = now - self.config.deleted_instance_retention();
        let purged = self
            .store
            .purge_deleted_instances(cutoff, self.config.purge_batch_size)
            .await?;
        if !purged.is_empty() {
            tracing::info!(purged = purged.len(), "Purged deleted instances");
        }
        Ok(purged)
    }
}
