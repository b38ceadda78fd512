//! Index store trait and SQLite implementation.

use crate::error::{IndexError, IndexResult};
use crate::repos::{ExtendedQueryTagRepo, InstanceRepo, PartitionRepo, TagErrorRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined index store trait.
#[async_trait]
pub trait IndexStore:
    PartitionRepo + InstanceRepo + ExtendedQueryTagRepo + TagErrorRepo + Send + Sync
{
    /// Run database migrations.
    async fn migrate(&self) -> IndexResult<()>;

    /// Check database connectivity and health.
    async fn health_check(&self) -> IndexResult<()>;
}

/// SQLite-based index store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
    #[allow(dead_code)] // Reserved for future timeout wrapper implementation
    query_timeout_secs: u64,
}

impl SqliteStore {
    /// Create a new SQLite store.
    pub async fn new(
        path: impl AsRef<Path>,
        query_timeout_secs: Option<u64>,
    ) -> IndexResult<Self> {
        let path = path.as_ref();
        let query_timeout_secs = query_timeout_secs.unwrap_or(600); // 10 minutes default

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            // SQLite permits limited write concurrency; a single connection
            // serializes writers and avoids persistent "database is locked"
            // failures. All uniqueness checks are still backed by constraints
            // so the behavior carries over to multi-writer substrates.
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self {
            pool,
            query_timeout_secs,
        };
        store.migrate().await?;

        tracing::warn!(
            query_timeout_secs = query_timeout_secs,
            "SQLite query timeout is advisory only - long queries may exceed timeout. \
             SQLite lacks statement cancellation; deploy a server-grade substrate behind \
             the same repository traits for strict timeout requirements."
        );

        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl IndexStore for SqliteStore {
    async fn migrate(&self) -> IndexResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> IndexResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Implement all the repository traits for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use gantry_core::{
        AddExtendedQueryTagEntry, ExtendedQueryTagStoreEntry, InstanceIdentifier, InstanceStatus,
        TagPath, TagVr, ValidationErrorCode, VersionedInstanceIdentifier,
    };
    use std::collections::{HashMap, HashSet};
    use time::OffsetDateTime;

    /// SQLite reports ~999 bind parameters max; stay under it when building
    /// dynamic IN clauses.
    const IN_CLAUSE_BATCH: usize = 900;

    fn is_unique_violation(err: &sqlx::Error, needle: &str) -> bool {
        if let sqlx::Error::Database(db_err) = err {
            db_err.message().contains("UNIQUE constraint") && db_err.message().contains(needle)
        } else {
            false
        }
    }

    /// Allocate the next watermark from the sequence, inside the caller's
    /// transaction. Strictly increasing; values are never reused.
    async fn next_watermark(tx: &mut sqlx::Transaction<'_, Sqlite>) -> IndexResult<i64> {
        let watermark: i64 = sqlx::query_scalar(
            "UPDATE watermark_sequence SET current_value = current_value + 1 WHERE id = 1 \
             RETURNING current_value",
        )
        .fetch_one(&mut **tx)
        .await?;
        Ok(watermark)
    }

    /// Remove every tag error keyed by the given watermarks and decrement
    /// each affected tag's error_count by the number of rows it lost, inside
    /// the caller's transaction. Returns (errors deleted, tags affected).
    async fn cascade_errors_for_watermarks(
        tx: &mut sqlx::Transaction<'_, Sqlite>,
        watermarks: &[i64],
    ) -> IndexResult<(u64, u64)> {
        if watermarks.is_empty() {
            return Ok((0, 0));
        }

        let mut errors_deleted = 0u64;
        let mut removed_per_tag: HashMap<i64, i64> = HashMap::new();

        for batch in watermarks.chunks(IN_CLAUSE_BATCH) {
            let placeholders: Vec<&str> = batch.iter().map(|_| "?").collect();
            let placeholders = placeholders.join(", ");

            let count_query = format!(
                "SELECT tag_key, COUNT(*) FROM extended_query_tag_errors \
                 WHERE watermark IN ({placeholders}) GROUP BY tag_key"
            );
            let mut query_builder = sqlx::query_as::<_, (i64, i64)>(&count_query);
            for watermark in batch {
                query_builder = query_builder.bind(watermark);
            }
            for (tag_key, count) in query_builder.fetch_all(&mut **tx).await? {
                *removed_per_tag.entry(tag_key).or_insert(0) += count;
            }

            let delete_query = format!(
                "DELETE FROM extended_query_tag_errors WHERE watermark IN ({placeholders})"
            );
            let mut query_builder = sqlx::query(&delete_query);
            for watermark in batch {
                query_builder = query_builder.bind(watermark);
            }
            errors_deleted += query_builder.execute(&mut **tx).await?.rows_affected();
        }

        // The count decrements; the query status stays disabled (one-way
        // latch, re-enabling is an administrative action).
        for (tag_key, count) in &removed_per_tag {
            sqlx::query(
                "UPDATE extended_query_tags SET error_count = error_count - ? WHERE tag_key = ?",
            )
            .bind(count)
            .bind(tag_key)
            .execute(&mut **tx)
            .await?;
        }

        Ok((errors_deleted, removed_per_tag.len() as u64))
    }

    impl SqliteStore {
        /// Soft-delete every non-deleted instance in the given scope and, in
        /// the same transaction, cascade-delete their error rows. The scope
        /// narrows from study to series to single instance as the optional
        /// filters are supplied.
        async fn soft_delete_scope(
            &self,
            partition_key: i64,
            study_instance_uid: &str,
            series_instance_uid: Option<&str>,
            sop_instance_uid: Option<&str>,
        ) -> IndexResult<CascadeOutcome> {
            let mut tx = self.pool.begin().await?;
            let deleted_at = OffsetDateTime::now_utc();

            // Capture all three watermark columns: errors recorded against a
            // pre-update or staged version must not dangle.
            let deleted: Vec<(i64, Option<i64>, Option<i64>)> =
                match (series_instance_uid, sop_instance_uid) {
                    (Some(series), Some(sop)) => {
                        sqlx::query_as(
                            "UPDATE instances SET status = 'deleted', deleted_at = ? \
                             WHERE partition_key = ? AND study_instance_uid = ? \
                               AND series_instance_uid = ? AND sop_instance_uid = ? \
                               AND status != 'deleted' \
                             RETURNING watermark, original_watermark, new_watermark",
                        )
                        .bind(deleted_at)
                        .bind(partition_key)
                        .bind(study_instance_uid)
                        .bind(series)
                        .bind(sop)
                        .fetch_all(&mut *tx)
                        .await?
                    }
                    (Some(series), None) => {
                        sqlx::query_as(
                            "UPDATE instances SET status = 'deleted', deleted_at = ? \
                             WHERE partition_key = ? AND study_instance_uid = ? \
                               AND series_instance_uid = ? AND status != 'deleted' \
                             RETURNING watermark, original_watermark, new_watermark",
                        )
                        .bind(deleted_at)
                        .bind(partition_key)
                        .bind(study_instance_uid)
                        .bind(series)
                        .fetch_all(&mut *tx)
                        .await?
                    }
                    (None, None) => {
                        sqlx::query_as(
                            "UPDATE instances SET status = 'deleted', deleted_at = ? \
                             WHERE partition_key = ? AND study_instance_uid = ? \
                               AND status != 'deleted' \
                             RETURNING watermark, original_watermark, new_watermark",
                        )
                        .bind(deleted_at)
                        .bind(partition_key)
                        .bind(study_instance_uid)
                        .fetch_all(&mut *tx)
                        .await?
                    }
                    (None, Some(_)) => {
                        return Err(IndexError::Internal(
                            "SOP-level deletion requires a series filter".to_string(),
                        ));
                    }
                };

            let mut watermarks: Vec<i64> = Vec::with_capacity(deleted.len());
            for (watermark, original, staged) in &deleted {
                watermarks.push(*watermark);
                watermarks.extend(original.iter());
                watermarks.extend(staged.iter());
            }
            watermarks.sort_unstable();
            watermarks.dedup();

            let (errors_deleted, tags_affected) =
                cascade_errors_for_watermarks(&mut tx, &watermarks).await?;

            tx.commit().await?;

            if errors_deleted > 0 {
                tracing::debug!(
                    partition_key,
                    study_instance_uid,
                    errors_deleted,
                    tags_affected,
                    "Cascaded tag error deletion with instance delete"
                );
            }

            Ok(CascadeOutcome {
                instances_deleted: deleted.len() as u64,
                errors_deleted,
                tags_affected,
            })
        }
    }

    #[async_trait]
    impl PartitionRepo for SqliteStore {
        async fn get_or_add_partition(
            &self,
            name: &str,
            created_at: OffsetDateTime,
        ) -> IndexResult<PartitionRow> {
            gantry_core::identifier::validate_partition_name(name)?;

            // The unique name constraint resolves concurrent creation races:
            // at most one INSERT wins, everyone re-selects the same row.
            sqlx::query(
                "INSERT OR IGNORE INTO partitions (partition_name, created_at) VALUES (?, ?)",
            )
            .bind(name)
            .bind(created_at)
            .execute(&self.pool)
            .await?;

            self.get_partition(name).await
        }

        async fn get_partition(&self, name: &str) -> IndexResult<PartitionRow> {
            let row = sqlx::query_as::<_, PartitionRow>(
                "SELECT * FROM partitions WHERE partition_name = ?",
            )
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or_else(|| IndexError::PartitionNotFound(name.to_string()))
        }

        async fn list_partitions(&self) -> IndexResult<Vec<PartitionRow>> {
            let rows = sqlx::query_as::<_, PartitionRow>(
                "SELECT * FROM partitions ORDER BY partition_name",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }
    }

    #[async_trait]
    impl InstanceRepo for SqliteStore {
        async fn begin_create_instance(
            &self,
            identifier: &InstanceIdentifier,
            transfer_syntax_uid: Option<&str>,
            has_frame_metadata: bool,
            created_at: OffsetDateTime,
        ) -> IndexResult<i64> {
            let mut tx = self.pool.begin().await?;

            // One live row per identity: an in-flight `creating` row counts
            // as a conflict so concurrent creators resolve to one winner.
            let existing: Option<String> = sqlx::query_scalar(
                "SELECT status FROM instances \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status != 'deleted' LIMIT 1",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .fetch_optional(&mut *tx)
            .await?;

            if existing.is_some() {
                return Err(IndexError::InstanceAlreadyExists(identifier.to_string()));
            }

            let watermark = next_watermark(&mut tx).await?;

            let insert = sqlx::query(
                r#"
                INSERT INTO instances (
                    partition_key, study_instance_uid, series_instance_uid, sop_instance_uid,
                    watermark, status, transfer_syntax_uid, has_frame_metadata, created_at
                ) VALUES (?, ?, ?, ?, ?, 'creating', ?, ?, ?)
                "#,
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .bind(watermark)
            .bind(transfer_syntax_uid)
            .bind(has_frame_metadata)
            .bind(created_at)
            .execute(&mut *tx)
            .await;

            if let Err(e) = insert {
                // Constraint backup for the read-then-write check above.
                if is_unique_violation(&e, "instances") {
                    return Err(IndexError::InstanceAlreadyExists(identifier.to_string()));
                }
                return Err(e.into());
            }

            tx.commit().await?;
            Ok(watermark)
        }

        async fn end_create_instance(
            &self,
            identifier: &InstanceIdentifier,
            watermark: i64,
        ) -> IndexResult<()> {
            let result = sqlx::query(
                "UPDATE instances SET status = 'created' \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND watermark = ? AND status = 'creating'",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .bind(watermark)
            .execute(&self.pool)
            .await;

            match result {
                Err(e) if is_unique_violation(&e, "instances") => {
                    Err(IndexError::InstanceAlreadyExists(identifier.to_string()))
                }
                Err(e) => Err(e.into()),
                Ok(r) if r.rows_affected() == 0 => {
                    Err(IndexError::InstanceNotFound(identifier.to_string()))
                }
                Ok(_) => Ok(()),
            }
        }

        async fn get_instance(&self, identifier: &InstanceIdentifier) -> IndexResult<InstanceRow> {
            let row = sqlx::query_as::<_, InstanceRow>(
                "SELECT * FROM instances \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status = 'created'",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or_else(|| IndexError::InstanceNotFound(identifier.to_string()))
        }

        async fn get_instance_identifiers(
            &self,
            partition_key: i64,
            study_instance_uid: &str,
            series_instance_uid: Option<&str>,
            sop_instance_uid: Option<&str>,
        ) -> IndexResult<Vec<VersionedInstanceIdentifier>> {
            let rows: Vec<InstanceRow> = match (series_instance_uid, sop_instance_uid) {
                (Some(series), Some(sop)) => {
                    sqlx::query_as(
                        "SELECT * FROM instances \
                         WHERE partition_key = ? AND study_instance_uid = ? \
                           AND series_instance_uid = ? AND sop_instance_uid = ? \
                           AND status = 'created' ORDER BY watermark",
                    )
                    .bind(partition_key)
                    .bind(study_instance_uid)
                    .bind(series)
                    .bind(sop)
                    .fetch_all(&self.pool)
                    .await?
                }
                (Some(series), None) => {
                    sqlx::query_as(
                        "SELECT * FROM instances \
                         WHERE partition_key = ? AND study_instance_uid = ? \
                           AND series_instance_uid = ? \
                           AND status = 'created' ORDER BY watermark",
                    )
                    .bind(partition_key)
                    .bind(study_instance_uid)
                    .bind(series)
                    .fetch_all(&self.pool)
                    .await?
                }
                (None, None) => {
                    sqlx::query_as(
                        "SELECT * FROM instances \
                         WHERE partition_key = ? AND study_instance_uid = ? \
                           AND status = 'created' ORDER BY watermark",
                    )
                    .bind(partition_key)
                    .bind(study_instance_uid)
                    .fetch_all(&self.pool)
                    .await?
                }
                (None, Some(_)) => {
                    return Err(IndexError::Internal(
                        "SOP-level lookup requires a series filter".to_string(),
                    ));
                }
            };

            let mut identifiers = Vec::with_capacity(rows.len());
            for row in rows {
                identifiers.push(row.versioned_identifier()?);
            }
            Ok(identifiers)
        }

        async fn get_instance_batches(
            &self,
            batch_size: u32,
            batch_count: u32,
            status: InstanceStatus,
            max_watermark: Option<i64>,
        ) -> IndexResult<Vec<WatermarkRange>> {
            if batch_size == 0 || batch_count == 0 {
                return Ok(Vec::new());
            }

            // Bounded snapshot: grab the highest candidate watermarks (most
            // recent work first), no locks held beyond the read.
            let limit = i64::from(batch_size) * i64::from(batch_count);
            let mut watermarks: Vec<i64> = match max_watermark {
                Some(max) => {
                    sqlx::query_scalar(
                        "SELECT watermark FROM instances WHERE status = ? AND watermark <= ? \
                         ORDER BY watermark DESC LIMIT ?",
                    )
                    .bind(status.as_str())
                    .bind(max)
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
                None => {
                    sqlx::query_scalar(
                        "SELECT watermark FROM instances WHERE status = ? \
                         ORDER BY watermark DESC LIMIT ?",
                    )
                    .bind(status.as_str())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
                }
            };
            watermarks.reverse();

            let ranges = watermarks
                .chunks(batch_size as usize)
                .map(|chunk| WatermarkRange {
                    start: chunk[0],
                    end: chunk[chunk.len() - 1],
                })
                .collect();
            Ok(ranges)
        }

        async fn delete_instance(
            &self,
            identifier: &InstanceIdentifier,
        ) -> IndexResult<CascadeOutcome> {
            self.soft_delete_scope(
                identifier.partition_key(),
                identifier.study_instance_uid(),
                Some(identifier.series_instance_uid()),
                Some(identifier.sop_instance_uid()),
            )
            .await
        }

        async fn delete_series(
            &self,
            partition_key: i64,
            study_instance_uid: &str,
            series_instance_uid: &str,
        ) -> IndexResult<CascadeOutcome> {
            self.soft_delete_scope(
                partition_key,
                study_instance_uid,
                Some(series_instance_uid),
                None,
            )
            .await
        }

        async fn delete_study(
            &self,
            partition_key: i64,
            study_instance_uid: &str,
        ) -> IndexResult<CascadeOutcome> {
            self.soft_delete_scope(partition_key, study_instance_uid, None, None)
                .await
        }

        async fn stage_instance_update(
            &self,
            identifier: &InstanceIdentifier,
        ) -> IndexResult<i64> {
            let mut tx = self.pool.begin().await?;

            let exists: Option<i64> = sqlx::query_scalar(
                "SELECT watermark FROM instances \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status = 'created'",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .fetch_optional(&mut *tx)
            .await?;

            if exists.is_none() {
                return Err(IndexError::InstanceNotFound(identifier.to_string()));
            }

            let watermark = next_watermark(&mut tx).await?;

            sqlx::query(
                "UPDATE instances SET new_watermark = ? \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status = 'created'",
            )
            .bind(watermark)
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(watermark)
        }

        async fn complete_instance_update(
            &self,
            identifier: &InstanceIdentifier,
        ) -> IndexResult<()> {
            let mut tx = self.pool.begin().await?;

            let staged: Option<(i64, Option<i64>)> = sqlx::query_as(
                "SELECT watermark, new_watermark FROM instances \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status = 'created'",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .fetch_optional(&mut *tx)
            .await?;

            let (_, new_watermark) = match staged {
                None => return Err(IndexError::InstanceNotFound(identifier.to_string())),
                Some(row) => row,
            };
            if new_watermark.is_none() {
                return Err(IndexError::InvalidStateTransition {
                    from: "created".to_string(),
                    to: "updated (no staged watermark)".to_string(),
                });
            }

            // The first promotion remembers the pre-update watermark so
            // errors recorded against it stay reachable.
            sqlx::query(
                "UPDATE instances SET \
                   original_watermark = COALESCE(original_watermark, watermark), \
                   watermark = new_watermark, \
                   new_watermark = NULL \
                 WHERE partition_key = ? AND study_instance_uid = ? \
                   AND series_instance_uid = ? AND sop_instance_uid = ? \
                   AND status = 'created'",
            )
            .bind(identifier.partition_key())
            .bind(identifier.study_instance_uid())
            .bind(identifier.series_instance_uid())
            .bind(identifier.sop_instance_uid())
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(())
        }

        async fn purge_deleted_instances(
            &self,
            older_than: OffsetDateTime,
            limit: u32,
        ) -> IndexResult<Vec<VersionedInstanceIdentifier>> {
            let mut tx = self.pool.begin().await?;

            let candidates: Vec<InstanceRow> = sqlx::query_as(
                "SELECT * FROM instances WHERE status = 'deleted' AND deleted_at < ? \
                 ORDER BY deleted_at LIMIT ?",
            )
            .bind(older_than)
            .bind(limit)
            .fetch_all(&mut *tx)
            .await?;

            // Error rows were already removed when the soft delete cascaded,
            // so purging is a plain row removal.
            let mut purged = Vec::with_capacity(candidates.len());
            for row in candidates {
                let deleted = sqlx::query(
                    "DELETE FROM instances \
                     WHERE partition_key = ? AND study_instance_uid = ? \
                       AND series_instance_uid = ? AND sop_instance_uid = ? \
                       AND watermark = ? AND status = 'deleted'",
                )
                .bind(row.partition_key)
                .bind(&row.study_instance_uid)
                .bind(&row.series_instance_uid)
                .bind(&row.sop_instance_uid)
                .bind(row.watermark)
                .execute(&mut *tx)
                .await?;

                if deleted.rows_affected() > 0 {
                    purged.push(row.versioned_identifier()?);
                }
            }

            tx.commit().await?;
            Ok(purged)
        }
    }

    #[async_trait]
    impl ExtendedQueryTagRepo for SqliteStore {
        async fn add_extended_query_tags(
            &self,
            entries: &[AddExtendedQueryTagEntry],
            max_allowed_count: usize,
            created_at: OffsetDateTime,
        ) -> IndexResult<Vec<ExtendedQueryTagStoreEntry>> {
            if entries.is_empty() {
                return Ok(Vec::new());
            }

            let mut tx = self.pool.begin().await?;

            let current: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM extended_query_tags")
                .fetch_one(&mut *tx)
                .await?;
            let current = current as usize;
            if current + entries.len() > max_allowed_count {
                return Err(IndexError::ExtendedQueryTagCountExceeded {
                    current,
                    adding: entries.len(),
                    max: max_allowed_count,
                });
            }

            let mut seen: HashSet<&str> = HashSet::with_capacity(entries.len());
            for entry in entries {
                if !seen.insert(entry.path.as_str()) {
                    return Err(IndexError::ExtendedQueryTagAlreadyExists(
                        entry.path.to_string(),
                    ));
                }
            }

            let mut assigned = Vec::with_capacity(entries.len());
            for entry in entries {
                let result = sqlx::query_scalar::<_, i64>(
                    "INSERT INTO extended_query_tags \
                       (tag_path, tag_vr, tag_level, query_status, error_count, created_at) \
                     VALUES (?, ?, ?, 'enabled', 0, ?) RETURNING tag_key",
                )
                .bind(entry.path.as_str())
                .bind(entry.vr.as_str())
                .bind(entry.level.as_str())
                .bind(created_at)
                .fetch_one(&mut *tx)
                .await;

                match result {
                    Ok(tag_key) => assigned.push(ExtendedQueryTagStoreEntry {
                        key: tag_key,
                        path: entry.path.clone(),
                    }),
                    // Dropping the transaction rolls back the whole batch.
                    Err(e) if is_unique_violation(&e, "tag_path") => {
                        return Err(IndexError::ExtendedQueryTagAlreadyExists(
                            entry.path.to_string(),
                        ));
                    }
                    Err(e) => return Err(e.into()),
                }
            }

            tx.commit().await?;
            Ok(assigned)
        }

        async fn get_extended_query_tag(
            &self,
            path: &TagPath,
        ) -> IndexResult<ExtendedQueryTagRow> {
            let row = sqlx::query_as::<_, ExtendedQueryTagRow>(
                "SELECT * FROM extended_query_tags WHERE tag_path = ?",
            )
            .bind(path.as_str())
            .fetch_optional(&self.pool)
            .await?;
            row.ok_or_else(|| IndexError::ExtendedQueryTagNotFound(path.to_string()))
        }

        async fn list_extended_query_tags(
            &self,
            limit: u32,
            offset: u32,
        ) -> IndexResult<Vec<ExtendedQueryTagRow>> {
            let rows = sqlx::query_as::<_, ExtendedQueryTagRow>(
                "SELECT * FROM extended_query_tags ORDER BY tag_key LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn delete_extended_query_tag(
            &self,
            path: &TagPath,
            vr: &TagVr,
        ) -> IndexResult<u64> {
            let mut tx = self.pool.begin().await?;

            let tag: Option<ExtendedQueryTagRow> = sqlx::query_as(
                "SELECT * FROM extended_query_tags WHERE tag_path = ?",
            )
            .bind(path.as_str())
            .fetch_optional(&mut *tx)
            .await?;

            let tag = match tag {
                // A mismatched VR addresses a tag that does not exist.
                Some(tag) if tag.tag_vr == vr.as_str() => tag,
                _ => return Err(IndexError::ExtendedQueryTagNotFound(path.to_string())),
            };

            let errors_deleted =
                sqlx::query("DELETE FROM extended_query_tag_errors WHERE tag_key = ?")
                    .bind(tag.tag_key)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected();

            sqlx::query("DELETE FROM extended_query_tags WHERE tag_key = ?")
                .bind(tag.tag_key)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;

            tracing::debug!(
                tag_path = %path,
                tag_key = tag.tag_key,
                errors_deleted,
                "Deleted extended query tag"
            );
            Ok(errors_deleted)
        }
    }

    #[async_trait]
    impl TagErrorRepo for SqliteStore {
        async fn add_error(
            &self,
            tag_key: i64,
            error_code: ValidationErrorCode,
            watermark: i64,
            created_at: OffsetDateTime,
        ) -> IndexResult<()> {
            let mut tx = self.pool.begin().await?;

            let live: Option<i64> =
                sqlx::query_scalar("SELECT tag_key FROM extended_query_tags WHERE tag_key = ?")
                    .bind(tag_key)
                    .fetch_optional(&mut *tx)
                    .await?;
            if live.is_none() {
                return Err(IndexError::ExtendedQueryTagNotFound(tag_key.to_string()));
            }

            // The watermark must belong to a non-deleted instance. A delete
            // that commits first wins: accepting the error here would create
            // a row the cascade can never reach, since re-deleting the
            // instance is a no-op.
            let owner: Option<i64> = sqlx::query_scalar(
                "SELECT watermark FROM instances \
                 WHERE status != 'deleted' \
                   AND ? IN (watermark, original_watermark, new_watermark) LIMIT 1",
            )
            .bind(watermark)
            .fetch_optional(&mut *tx)
            .await?;
            if owner.is_none() {
                return Err(IndexError::InstanceNotFound(watermark.to_string()));
            }

            // INSERT OR IGNORE keyed by (tag_key, watermark): only the first
            // error for a pair counts, so the increment-and-disable below can
            // never double-fire for the same instance version.
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO extended_query_tag_errors \
                   (tag_key, watermark, error_code, created_at) VALUES (?, ?, ?, ?)",
            )
            .bind(tag_key)
            .bind(watermark)
            .bind(error_code.code())
            .bind(created_at)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                > 0;

            if inserted {
                sqlx::query(
                    "UPDATE extended_query_tags \
                     SET error_count = error_count + 1, query_status = 'disabled' \
                     WHERE tag_key = ?",
                )
                .bind(tag_key)
                .execute(&mut *tx)
                .await?;
            } else {
                // Replay for an existing pair: last write wins for the code,
                // the count is unaffected.
                sqlx::query(
                    "UPDATE extended_query_tag_errors SET error_code = ?, created_at = ? \
                     WHERE tag_key = ? AND watermark = ?",
                )
                .bind(error_code.code())
                .bind(created_at)
                .bind(tag_key)
                .bind(watermark)
                .execute(&mut *tx)
                .await?;
            }

            tx.commit().await?;
            Ok(())
        }

        async fn get_errors(
            &self,
            path: &TagPath,
            limit: u32,
            offset: u32,
        ) -> IndexResult<Vec<TagErrorDetailRow>> {
            // Tag resolution and the page read share a transaction so a tag
            // deleted mid-pagination surfaces NotFound rather than an empty
            // page.
            let mut tx = self.pool.begin().await?;

            let tag_key: Option<i64> =
                sqlx::query_scalar("SELECT tag_key FROM extended_query_tags WHERE tag_path = ?")
                    .bind(path.as_str())
                    .fetch_optional(&mut *tx)
                    .await?;
            let tag_key =
                tag_key.ok_or_else(|| IndexError::ExtendedQueryTagNotFound(path.to_string()))?;

            // Join on all three watermark columns: an error recorded against
            // a pre-update version stays visible after promotion.
            let rows = sqlx::query_as::<_, TagErrorDetailRow>(
                "SELECT e.tag_key, e.watermark, e.error_code, e.created_at, \
                        i.partition_key, i.study_instance_uid, i.series_instance_uid, \
                        i.sop_instance_uid \
                 FROM extended_query_tag_errors e \
                 JOIN instances i \
                   ON e.watermark IN (i.watermark, i.original_watermark, i.new_watermark) \
                 WHERE e.tag_key = ? \
                 ORDER BY e.watermark LIMIT ? OFFSET ?",
            )
            .bind(tag_key)
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(rows)
        }
    }
}

/// SQL schema for SQLite.
const SCHEMA_SQL: &str = r#"
-- Partitions
CREATE TABLE IF NOT EXISTS partitions (
    partition_key INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_name TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_partitions_name ON partitions(partition_name);
INSERT OR IGNORE INTO partitions (partition_key, partition_name, created_at)
VALUES (1, 'default', CURRENT_TIMESTAMP);

-- Watermark sequence: allocation happens inside the creating transaction
CREATE TABLE IF NOT EXISTS watermark_sequence (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    current_value INTEGER NOT NULL
);
INSERT OR IGNORE INTO watermark_sequence (id, current_value) VALUES (1, 0);

-- Instance index
CREATE TABLE IF NOT EXISTS instances (
    partition_key INTEGER NOT NULL REFERENCES partitions(partition_key),
    study_instance_uid TEXT NOT NULL,
    series_instance_uid TEXT NOT NULL,
    sop_instance_uid TEXT NOT NULL,
    watermark INTEGER NOT NULL UNIQUE,
    status TEXT NOT NULL DEFAULT 'creating',
    transfer_syntax_uid TEXT,
    has_frame_metadata INTEGER NOT NULL DEFAULT 0,
    original_watermark INTEGER,
    new_watermark INTEGER,
    created_at TEXT NOT NULL,
    deleted_at TEXT,
    PRIMARY KEY (partition_key, study_instance_uid, series_instance_uid, sop_instance_uid, watermark)
);
-- At most one live row per identity (partial unique index backs up the
-- read-then-insert check in begin_create_instance under races)
CREATE UNIQUE INDEX IF NOT EXISTS idx_instances_identity_live
ON instances(partition_key, study_instance_uid, series_instance_uid, sop_instance_uid)
WHERE status IN ('creating', 'created');
CREATE INDEX IF NOT EXISTS idx_instances_status_watermark ON instances(status, watermark);
CREATE INDEX IF NOT EXISTS idx_instances_series
ON instances(partition_key, study_instance_uid, series_instance_uid);
CREATE INDEX IF NOT EXISTS idx_instances_purge ON instances(status, deleted_at);

-- Extended query tag catalog
CREATE TABLE IF NOT EXISTS extended_query_tags (
    tag_key INTEGER PRIMARY KEY AUTOINCREMENT,
    tag_path TEXT NOT NULL UNIQUE,
    tag_vr TEXT NOT NULL,
    tag_level TEXT NOT NULL,
    query_status TEXT NOT NULL DEFAULT 'enabled',
    error_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tags_path ON extended_query_tags(tag_path);

-- Extended query tag errors: at most one row per (tag_key, watermark).
-- No database-level cascade triggers; all cascading is explicit
-- transactional code so the discipline is portable across substrates.
CREATE TABLE IF NOT EXISTS extended_query_tag_errors (
    tag_key INTEGER NOT NULL,
    watermark INTEGER NOT NULL,
    error_code INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (tag_key, watermark)
);
CREATE INDEX IF NOT EXISTS idx_tag_errors_watermark ON extended_query_tag_errors(watermark);
"#;
