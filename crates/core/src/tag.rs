//! Extended query tag types: attribute paths, value representations,
//! levels, and query eligibility.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Value representations eligible for extended query tag indexing.
///
/// String-comparable, date/time, and numeric VRs only; bulk-data VRs (OB,
/// OW, SQ payloads, ...) are never indexable.
const INDEXABLE_VRS: &[&str] = &[
    "AE", "AS", "CS", "DA", "DS", "DT", "FD", "FL", "IS", "LO", "PN", "SH", "SL", "SS", "TM", "UI",
    "UL", "US",
];

/// A DICOM attribute path addressing an extended query tag.
///
/// A path is one or more dot-separated attribute ids, each eight hex digits
/// (group + element), e.g. `00101010` or `0040A730.00080100` for an
/// attribute nested in a sequence. Stored normalized to uppercase.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagPath(String);

impl TagPath {
    /// Parse and normalize a tag path.
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.is_empty() {
            return Err(crate::Error::InvalidTagPath(
                "tag path cannot be empty".to_string(),
            ));
        }
        for component in path.split('.') {
            if component.len() != 8 || !component.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(crate::Error::InvalidTagPath(format!(
                    "expected eight hex digits per component, got '{component}'"
                )));
            }
        }
        Ok(Self(path.to_ascii_uppercase()))
    }

    /// Get the normalized path string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagPath({self})")
    }
}

impl fmt::Display for TagPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for TagPath {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        Self::parse(s)
    }
}

/// A DICOM value representation restricted to the indexable set.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TagVr(String);

impl TagVr {
    /// Parse a VR code, rejecting non-indexable VRs.
    pub fn parse(vr: &str) -> crate::Result<Self> {
        let upper = vr.to_ascii_uppercase();
        if !INDEXABLE_VRS.contains(&upper.as_str()) {
            return Err(crate::Error::InvalidVr(vr.to_string()));
        }
        Ok(Self(upper))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for TagVr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TagVr({self})")
    }
}

impl fmt::Display for TagVr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Containment level an extended query tag is indexed at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryTagLevel {
    Instance,
    Series,
    Study,
}

impl QueryTagLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Instance => "instance",
            Self::Series => "series",
            Self::Study => "study",
        }
    }
}

impl FromStr for QueryTagLevel {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "instance" => Ok(Self::Instance),
            "series" => Ok(Self::Series),
            "study" => Ok(Self::Study),
            other => Err(crate::Error::UnknownLevel(other.to_string())),
        }
    }
}

/// Query eligibility of an extended query tag.
///
/// A tag is `Enabled` until its first validation error is recorded; the
/// error store flips it to `Disabled` and never flips it back. Re-enabling
/// is an out-of-band administrative action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Enabled,
    Disabled,
}

impl QueryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enabled => "enabled",
            Self::Disabled => "disabled",
        }
    }
}

impl FromStr for QueryStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "enabled" => Ok(Self::Enabled),
            "disabled" => Ok(Self::Disabled),
            other => Err(crate::Error::UnknownQueryStatus(other.to_string())),
        }
    }
}

/// Input entry for registering an extended query tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddExtendedQueryTagEntry {
    pub path: TagPath,
    pub vr: TagVr,
    pub level: QueryTagLevel,
}

/// Key assignment returned after registering an extended query tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtendedQueryTagStoreEntry {
    pub key: i64,
    pub path: TagPath,
}
