//! Integration tests for the partition registry.

mod common;

use common::TestIndex;
use gantry_core::{DEFAULT_PARTITION_KEY, DEFAULT_PARTITION_NAME};
use gantry_index::IndexError;
use time::OffsetDateTime;

#[tokio::test]
async fn test_default_partition_seeded() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();

    let partition = store
        .get_partition(DEFAULT_PARTITION_NAME)
        .await
        .expect("Default partition missing");
    assert_eq!(partition.partition_key, DEFAULT_PARTITION_KEY);
    assert_eq!(partition.partition_name, DEFAULT_PARTITION_NAME);
}

#[tokio::test]
async fn test_get_or_add_partition_creates_then_returns_same() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();

    let first = store
        .get_or_add_partition("clinic-a", now)
        .await
        .expect("Create partition failed");
    assert_ne!(first.partition_key, DEFAULT_PARTITION_KEY);

    // Same name resolves to the same key, not a new row.
    let second = store
        .get_or_add_partition("clinic-a", now)
        .await
        .expect("Get partition failed");
    assert_eq!(second.partition_key, first.partition_key);

    let partitions = store.list_partitions().await.expect("List failed");
    assert_eq!(partitions.len(), 2);
}

#[tokio::test]
async fn test_partition_keys_are_distinct() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();

    let a = store
        .get_or_add_partition("clinic-a", now)
        .await
        .expect("Create failed");
    let b = store
        .get_or_add_partition("clinic-b", now)
        .await
        .expect("Create failed");
    assert_ne!(a.partition_key, b.partition_key);
}

#[tokio::test]
async fn test_get_partition_unknown_name_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();

    let err = store.get_partition("no-such-partition").await.unwrap_err();
    assert!(matches!(err, IndexError::PartitionNotFound(_)));
}

#[tokio::test]
async fn test_partition_name_validation() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();

    // Empty and oversized names are rejected before touching the database.
    assert!(store.get_or_add_partition("", now).await.is_err());
    let oversized = "x".repeat(65);
    assert!(store.get_or_add_partition(&oversized, now).await.is_err());

    let partitions = store.list_partitions().await.expect("List failed");
    assert_eq!(partitions.len(), 1);
}

#[tokio::test]
async fn test_list_partitions_ordered_by_name() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();

    store
        .get_or_add_partition("zebra", now)
        .await
        .expect("Create failed");
    store
        .get_or_add_partition("alpha", now)
        .await
        .expect("Create failed");

    let names: Vec<String> = store
        .list_partitions()
        .await
        .expect("List failed")
        .into_iter()
        .map(|p| p.partition_name)
        .collect();
    assert_eq!(names, vec!["alpha", "default", "zebra"]);
}
