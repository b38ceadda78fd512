//! Configuration types shared across crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Index store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum IndexConfig {
    /// SQLite database (single-writer; recommended for testing and
    /// single-node deployments).
    Sqlite {
        /// Database file path.
        path: PathBuf,
        /// Query timeout in seconds (advisory only - SQLite cannot
        /// force-cancel queries).
        #[serde(default = "default_sqlite_query_timeout_secs")]
        query_timeout_secs: Option<u64>,
    },
}

fn default_sqlite_query_timeout_secs() -> Option<u64> {
    Some(600) // 10 minutes (advisory only)
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from("./data/index.db"),
            query_timeout_secs: default_sqlite_query_timeout_secs(),
        }
    }
}

impl IndexConfig {
    /// Validate index configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            IndexConfig::Sqlite { path, .. } => {
                if path.as_os_str().is_empty() {
                    return Err("sqlite config requires a non-empty 'path'".to_string());
                }
                Ok(())
            }
        }
    }
}

/// Indexing policy configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct IndexingConfig {
    /// Maximum number of registered extended query tags.
    #[serde(default = "default_max_extended_query_tags")]
    pub max_extended_query_tags: usize,
    /// How long soft-deleted instances are retained before the purge
    /// removes their rows, in seconds.
    #[serde(default = "default_deleted_instance_retention_secs")]
    pub deleted_instance_retention_secs: u64,
    /// Maximum rows removed per purge pass.
    #[serde(default = "default_purge_batch_size")]
    pub purge_batch_size: u32,
}

fn default_max_extended_query_tags() -> usize {
    128
}

fn default_deleted_instance_retention_secs() -> u64 {
    3 * 24 * 3600 // 3 days
}

fn default_purge_batch_size() -> u32 {
    1000
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            max_extended_query_tags: default_max_extended_query_tags(),
            deleted_instance_retention_secs: default_deleted_instance_retention_secs(),
            purge_batch_size: default_purge_batch_size(),
        }
    }
}

impl IndexingConfig {
    /// Deleted-instance retention as a Duration.
    pub fn deleted_instance_retention(&self) -> time::Duration {
        let secs = i64::try_from(self.deleted_instance_retention_secs).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }
}
