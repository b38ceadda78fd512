//! Instance identity types and DICOM UID validation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Validate a DICOM UID.
///
/// A UID is 1..=64 characters of digits and dots, split into non-empty
/// numeric components. Components must not carry leading zeros unless the
/// component is exactly "0".
pub fn validate_uid(uid: &str) -> crate::Result<()> {
    if uid.is_empty() {
        return Err(crate::Error::InvalidUid("UID cannot be empty".to_string()));
    }
    if uid.len() > crate::MAX_UID_LENGTH {
        return Err(crate::Error::InvalidUid(format!(
            "UID exceeds {} characters: {}",
            crate::MAX_UID_LENGTH,
            uid.len()
        )));
    }
    for component in uid.split('.') {
        if component.is_empty() {
            return Err(crate::Error::InvalidUid(format!(
                "UID has an empty component: {uid}"
            )));
        }
        if !component.bytes().all(|b| b.is_ascii_digit()) {
            return Err(crate::Error::InvalidUid(format!(
                "UID has a non-numeric component: {uid}"
            )));
        }
        if component.len() > 1 && component.starts_with('0') {
            return Err(crate::Error::InvalidUid(format!(
                "UID component has a leading zero: {uid}"
            )));
        }
    }
    Ok(())
}

/// Validate a partition name: 1..=64 alphanumeric, '.', '-', '_' characters.
pub fn validate_partition_name(name: &str) -> crate::Result<()> {
    if name.is_empty() {
        return Err(crate::Error::InvalidPartitionName(
            "partition name cannot be empty".to_string(),
        ));
    }
    if name.len() > crate::MAX_PARTITION_NAME_LENGTH {
        return Err(crate::Error::InvalidPartitionName(format!(
            "partition name exceeds {} characters: {}",
            crate::MAX_PARTITION_NAME_LENGTH,
            name.len()
        )));
    }
    for c in name.chars() {
        if !matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '.' | '-' | '_') {
            return Err(crate::Error::InvalidPartitionName(format!(
                "invalid character in partition name: {c}"
            )));
        }
    }
    Ok(())
}

/// Fully qualified identity of a stored image instance.
///
/// Identity is the partition key plus the study/series/SOP UID triple. The
/// watermark is deliberately not part of the identity; an instance keeps its
/// identity across reindexing while its watermark changes.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentifier {
    partition_key: i64,
    study_instance_uid: String,
    series_instance_uid: String,
    sop_instance_uid: String,
}

impl InstanceIdentifier {
    /// Create an identifier, validating each UID.
    pub fn new(
        partition_key: i64,
        study_instance_uid: impl Into<String>,
        series_instance_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
    ) -> crate::Result<Self> {
        let study_instance_uid = study_instance_uid.into();
        let series_instance_uid = series_instance_uid.into();
        let sop_instance_uid = sop_instance_uid.into();
        validate_uid(&study_instance_uid)?;
        validate_uid(&series_instance_uid)?;
        validate_uid(&sop_instance_uid)?;
        Ok(Self {
            partition_key,
            study_instance_uid,
            series_instance_uid,
            sop_instance_uid,
        })
    }

    /// Partition key the instance belongs to.
    pub fn partition_key(&self) -> i64 {
        self.partition_key
    }

    /// Study instance UID.
    pub fn study_instance_uid(&self) -> &str {
        &self.study_instance_uid
    }

    /// Series instance UID.
    pub fn series_instance_uid(&self) -> &str {
        &self.series_instance_uid
    }

    /// SOP instance UID.
    pub fn sop_instance_uid(&self) -> &str {
        &self.sop_instance_uid
    }
}

impl fmt::Debug for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InstanceIdentifier({self})")
    }
}

impl fmt::Display for InstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.partition_key,
            self.study_instance_uid,
            self.series_instance_uid,
            self.sop_instance_uid
        )
    }
}

/// An instance identity together with the watermark version it was read at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedInstanceIdentifier {
    pub identifier: InstanceIdentifier,
    pub watermark: i64,
}

impl fmt::Display for VersionedInstanceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.identifier, self.watermark)
    }
}
