//! Instance lifecycle status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of an instance index row.
///
/// An instance is inserted as `Creating` with a fresh watermark, becomes
/// `Created` once indexing completes, and is soft-deleted to `Deleted` until
/// the retention purge removes the row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceStatus {
    Creating,
    Created,
    Deleted,
}

impl InstanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InstanceStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "creating" => Ok(Self::Creating),
            "created" => Ok(Self::Created),
            "deleted" => Ok(Self::Deleted),
            other => Err(crate::Error::UnknownStatus(other.to_string())),
        }
    }
}
