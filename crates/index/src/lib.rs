//! Metadata index layer for the imaging archive.
//!
//! Defines repository traits for partitions, instances, extended query tags,
//! and tag validation errors, plus a SQLite implementation. All consistency
//! rules (single-winner creation, idempotent error counting, explicit
//! cascading deletion) live in transactional repository code rather than
//! database triggers, so they carry over to any substrate implementing the
//! same traits.

pub mod error;
pub mod maintenance;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{IndexError, IndexResult};
pub use maintenance::IndexMaintenance;
pub use models::{CascadeOutcome, WatermarkRange};
pub use repos::{ExtendedQueryTagRepo, InstanceRepo, PartitionRepo, TagErrorRepo};
pub use store::{IndexStore, SqliteStore};

use gantry_core::IndexConfig;
use std::sync::Arc;

/// Create an index store from configuration.
pub async fn from_config(config: &IndexConfig) -> IndexResult<Arc<dyn IndexStore>> {
    config
        .validate()
        .map_err(|e| IndexError::Config(e.to_string()))?;

    match config {
        IndexConfig::Sqlite {
            path,
            query_timeout_secs,
        } => {
            tracing::info!(path = %path.display(), "Initializing SQLite index store");
            let store = SqliteStore::new(path, *query_timeout_secs).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_sqlite() {
        let dir = tempfile::tempdir().unwrap();
        let config = IndexConfig::Sqlite {
            path: dir.path().join("index.db"),
            query_timeout_secs: None,
        };

        let store = from_config(&config).await.unwrap();
        store.health_check().await.unwrap();
    }
}
