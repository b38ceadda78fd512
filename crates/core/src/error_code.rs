//! Attribute validation error codes.
//!
//! These codes classify why an instance attribute could not satisfy an
//! extended query tag's type constraints. The index stores the code; the
//! attribute extraction layer produces it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why validating an instance attribute against a tag failed.
///
/// Integer codes are part of the stored format and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(i64)]
pub enum ValidationErrorCode {
    /// The attribute held multiple values where one was expected.
    MultipleValues = 1,
    /// A value exceeded the VR's maximum length.
    ExceedMaxLength = 2,
    /// A fixed-length VR value had the wrong length.
    UnexpectedLength = 3,
    /// A value contained characters invalid for its VR.
    InvalidCharacters = 4,
    /// A person-name group exceeded its maximum length.
    PersonNameGroupExceedMaxLength = 5,
    /// A person name had more than five components in a group.
    PersonNameExceedMaxComponents = 6,
    /// A person name had more than three groups.
    PersonNameExceedMaxGroups = 7,
    /// A DA value was not a valid date.
    InvalidDate = 8,
    /// A TM value was not a valid time.
    InvalidTime = 9,
    /// A DT value was not a valid datetime.
    InvalidDateTime = 10,
    /// A UI value was not a valid UID.
    InvalidUid = 11,
}

impl ValidationErrorCode {
    /// Stored integer code.
    pub fn code(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleValues => "multiple values",
            Self::ExceedMaxLength => "exceeds max length",
            Self::UnexpectedLength => "unexpected length",
            Self::InvalidCharacters => "invalid characters",
            Self::PersonNameGroupExceedMaxLength => "person name group exceeds max length",
            Self::PersonNameExceedMaxComponents => "person name exceeds max components",
            Self::PersonNameExceedMaxGroups => "person name exceeds max groups",
            Self::InvalidDate => "invalid date",
            Self::InvalidTime => "invalid time",
            Self::InvalidDateTime => "invalid datetime",
            Self::InvalidUid => "invalid UID",
        }
    }
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<i64> for ValidationErrorCode {
    type Error = crate::Error;

    fn try_from(code: i64) -> crate::Result<Self> {
        match code {
            1 => Ok(Self::MultipleValues),
            2 => Ok(Self::ExceedMaxLength),
            3 => Ok(Self::UnexpectedLength),
            4 => Ok(Self::InvalidCharacters),
            5 => Ok(Self::PersonNameGroupExceedMaxLength),
            6 => Ok(Self::PersonNameExceedMaxComponents),
            7 => Ok(Self::PersonNameExceedMaxGroups),
            8 => Ok(Self::InvalidDate),
            9 => Ok(Self::InvalidTime),
            10 => Ok(Self::InvalidDateTime),
            11 => Ok(Self::InvalidUid),
            other => Err(crate::Error::UnknownErrorCode(other)),
        }
    }
}
