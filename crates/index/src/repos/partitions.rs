//! Partition registry repository.

use crate::error::IndexResult;
use crate::models::PartitionRow;
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for partition operations.
///
/// Partitions map a tenant-facing name to a stable integer key. The default
/// partition (key 1) is seeded at schema creation and always exists.
#[async_trait]
pub trait PartitionRepo: Send + Sync {
    /// Return the partition for `name`, creating it with a fresh key on
    /// first use. Concurrent calls with the same unseen name resolve to a
    /// single partition via the unique name constraint.
    async fn get_or_add_partition(
        &self,
        name: &str,
        created_at: OffsetDateTime,
    ) -> IndexResult<PartitionRow>;

    /// Get a partition by name. Fails with `PartitionNotFound` if absent.
    async fn get_partition(&self, name: &str) -> IndexResult<PartitionRow>;

    /// List all partitions ordered by name.
    async fn list_partitions(&self) -> IndexResult<Vec<PartitionRow>>;
}
