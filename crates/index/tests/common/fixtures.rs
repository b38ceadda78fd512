//! Test fixtures for generating index test data.

use gantry_core::{
    AddExtendedQueryTagEntry, InstanceIdentifier, QueryTagLevel, TagPath, TagVr,
    DEFAULT_PARTITION_KEY,
};
use gantry_index::{IndexResult, IndexStore};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::OffsetDateTime;

/// Counter for generating unique UIDs across a test run.
static UID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generate a unique, valid UID with the given numeric prefix.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub fn test_uid(prefix: &str) -> String {
    let counter = UID_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}.{counter}")
}

/// Build an instance identifier in the default partition with fresh UIDs.
#[allow(dead_code)]
pub fn test_identifier() -> InstanceIdentifier {
    identifier_in(DEFAULT_PARTITION_KEY)
}

/// Build an instance identifier in the given partition with fresh UIDs.
#[allow(dead_code)]
pub fn identifier_in(partition_key: i64) -> InstanceIdentifier {
    InstanceIdentifier::new(
        partition_key,
        test_uid("1.2.840.10008.100"),
        test_uid("1.2.840.10008.200"),
        test_uid("1.2.840.10008.300"),
    )
    .expect("Fixture UIDs are valid")
}

/// Build an identifier sharing the given study and series UIDs.
#[allow(dead_code)]
pub fn identifier_in_series(partition_key: i64, study: &str, series: &str) -> InstanceIdentifier {
    InstanceIdentifier::new(
        partition_key,
        study.to_string(),
        series.to_string(),
        test_uid("1.2.840.10008.300"),
    )
    .expect("Fixture UIDs are valid")
}

/// Build a catalog entry for the given tag path.
#[allow(dead_code)]
pub fn tag_entry(path: &str, vr: &str, level: QueryTagLevel) -> AddExtendedQueryTagEntry {
    AddExtendedQueryTagEntry {
        path: TagPath::parse(path).expect("Fixture tag path is valid"),
        vr: TagVr::parse(vr).expect("Fixture VR is valid"),
        level,
    }
}

/// Create an instance and complete its creation, returning its watermark.
#[allow(dead_code)]
pub async fn create_created_instance(
    store: &Arc<dyn IndexStore>,
    identifier: &InstanceIdentifier,
) -> IndexResult<i64> {
    let now = OffsetDateTime::now_utc();
    let watermark = store
        .begin_create_instance(identifier, Some("1.2.840.10008.1.2.1"), false, now)
        .await?;
    store.end_create_instance(identifier, watermark).await?;
    Ok(watermark)
}
