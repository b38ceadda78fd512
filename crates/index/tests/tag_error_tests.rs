//! Integration tests for the extended query tag error store.

mod common;

use common::fixtures::{create_created_instance, tag_entry, test_identifier};
use common::TestIndex;
use gantry_core::{QueryStatus, QueryTagLevel, TagPath, ValidationErrorCode};
use gantry_index::IndexError;
use time::OffsetDateTime;

#[tokio::test]
async fn test_add_error_counts_and_disables() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    let identifier = test_identifier();
    let watermark = create_created_instance(&store, &identifier)
        .await
        .expect("Create failed");

    store
        .add_error(tag_key, ValidationErrorCode::InvalidCharacters, watermark, now)
        .await
        .expect("Add error failed");

    let tag = store
        .get_extended_query_tag(&path)
        .await
        .expect("Get tag failed");
    assert_eq!(tag.error_count, 1);
    assert_eq!(
        tag.query_status().expect("Status parse"),
        QueryStatus::Disabled
    );
}

#[tokio::test]
async fn test_add_error_idempotent_per_instance_version() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    let watermark = create_created_instance(&store, &test_identifier())
        .await
        .expect("Create failed");

    store
        .add_error(tag_key, ValidationErrorCode::InvalidCharacters, watermark, now)
        .await
        .expect("Add error failed");
    // Replay with a different code: last write wins, no double count.
    store
        .add_error(tag_key, ValidationErrorCode::ExceedMaxLength, watermark, now)
        .await
        .expect("Replay failed");

    let tag = store
        .get_extended_query_tag(&path)
        .await
        .expect("Get tag failed");
    assert_eq!(tag.error_count, 1);

    let errors = store.get_errors(&path, 10, 0).await.expect("Get errors failed");
    assert_eq!(errors.len(), 1);
    assert_eq!(
        errors[0].error_code().expect("Code parse"),
        ValidationErrorCode::ExceedMaxLength
    );
}

#[tokio::test]
async fn test_add_error_distinct_watermarks_accumulate() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    for _ in 0..3 {
        let watermark = create_created_instance(&store, &test_identifier())
            .await
            .expect("Create failed");
        store
            .add_error(tag_key, ValidationErrorCode::InvalidDate, watermark, now)
            .await
            .expect("Add error failed");
    }

    let tag = store
        .get_extended_query_tag(&path)
        .await
        .expect("Get tag failed");
    assert_eq!(tag.error_count, 3);
}

#[tokio::test]
async fn test_add_error_unknown_tag_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();

    let watermark = create_created_instance(&store, &test_identifier())
        .await
        .expect("Create failed");

    let err = store
        .add_error(
            9999,
            ValidationErrorCode::InvalidCharacters,
            watermark,
            OffsetDateTime::now_utc(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::ExtendedQueryTagNotFound(_)));
}

#[tokio::test]
async fn test_get_errors_joined_and_paged() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    let mut expected = Vec::new();
    for _ in 0..3 {
        let identifier = test_identifier();
        let watermark = create_created_instance(&store, &identifier)
            .await
            .expect("Create failed");
        store
            .add_error(tag_key, ValidationErrorCode::InvalidUid, watermark, now)
            .await
            .expect("Add error failed");
        expected.push((identifier, watermark));
    }

    let page = store.get_errors(&path, 2, 0).await.expect("Get errors failed");
    assert_eq!(page.len(), 2);
    // Ascending watermark order, joined against the owning identity.
    assert_eq!(page[0].watermark, expected[0].1);
    assert_eq!(page[0].sop_instance_uid, expected[0].0.sop_instance_uid());
    assert_eq!(page[1].watermark, expected[1].1);

    let rest = store.get_errors(&path, 10, 2).await.expect("Get errors failed");
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].watermark, expected[2].1);

    // Limit past the end is not an error.
    let all = store.get_errors(&path, 100, 0).await.expect("Get errors failed");
    assert_eq!(all.len(), 3);
}

#[tokio::test]
async fn test_add_error_after_instance_delete_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    let identifier = test_identifier();
    let watermark = create_created_instance(&store, &identifier)
        .await
        .expect("Create failed");

    // The delete commits before the error lands; the error must be refused
    // or it could never be cascaded.
    store.delete_instance(&identifier).await.expect("Delete failed");

    let err = store
        .add_error(tag_key, ValidationErrorCode::InvalidUid, watermark, now)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InstanceNotFound(_)));

    let tag = store
        .get_extended_query_tag(&path)
        .await
        .expect("Get tag failed");
    assert_eq!(tag.error_count, 0);
    let errors = store.get_errors(&path, 10, 0).await.expect("Get errors failed");
    assert!(errors.is_empty());
}

#[tokio::test]
async fn test_add_error_unknown_watermark_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");

    let err = store
        .add_error(assigned[0].key, ValidationErrorCode::InvalidUid, 424242, now)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::InstanceNotFound(_)));
}

#[tokio::test]
async fn test_get_errors_unregistered_path_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();

    let err = store
        .get_errors(&TagPath::parse("00100020").expect("Valid path"), 10, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, IndexError::ExtendedQueryTagNotFound(_)));
}

#[tokio::test]
async fn test_get_errors_after_tag_delete_fails() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");
    let vr = gantry_core::TagVr::parse("LO").expect("Valid VR");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");

    let watermark = create_created_instance(&store, &test_identifier())
        .await
        .expect("Create failed");
    store
        .add_error(assigned[0].key, ValidationErrorCode::InvalidUid, watermark, now)
        .await
        .expect("Add error failed");

    store
        .delete_extended_query_tag(&path, &vr)
        .await
        .expect("Delete failed");

    // A tag deleted between pages must surface NotFound, not an empty page.
    let err = store.get_errors(&path, 10, 0).await.unwrap_err();
    assert!(matches!(err, IndexError::ExtendedQueryTagNotFound(_)));
}

#[tokio::test]
async fn test_errors_survive_in_place_update() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    let identifier = test_identifier();
    let original = create_created_instance(&store, &identifier)
        .await
        .expect("Create failed");
    store
        .add_error(tag_key, ValidationErrorCode::InvalidTime, original, now)
        .await
        .expect("Add error failed");

    // Reindex the instance in place; the error was recorded against the
    // pre-update watermark.
    store
        .stage_instance_update(&identifier)
        .await
        .expect("Stage failed");
    store
        .complete_instance_update(&identifier)
        .await
        .expect("Complete failed");

    let errors = store.get_errors(&path, 10, 0).await.expect("Get errors failed");
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].watermark, original);
    assert_eq!(errors[0].sop_instance_uid, identifier.sop_instance_uid());
}

#[tokio::test]
async fn test_delete_tag_removes_its_errors() {
    let index = TestIndex::new().await.expect("Failed to create index");
    let store = index.store();
    let now = OffsetDateTime::now_utc();
    let path = TagPath::parse("00100020").expect("Valid path");
    let vr = gantry_core::TagVr::parse("LO").expect("Valid VR");

    let assigned = store
        .add_extended_query_tags(&[tag_entry("00100020", "LO", QueryTagLevel::Study)], 128, now)
        .await
        .expect("Add tags failed");
    let tag_key = assigned[0].key;

    for _ in 0..2 {
        let watermark = create_created_instance(&store, &test_identifier())
            .await
            .expect("Create failed");
        store
            .add_error(tag_key, ValidationErrorCode::MultipleValues, watermark, now)
            .await
            .expect("Add error failed");
    }

    let errors_deleted = store
        .delete_extended_query_tag(&path, &vr)
        .await
        .expect("Delete failed");
    assert_eq!(errors_deleted, 2);

    let orphans: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM extended_query_tag_errors WHERE tag_key = ?")
            .bind(tag_key)
            .fetch_one(index.pool())
            .await
            .expect("Count failed");
    assert_eq!(orphans, 0);
}
