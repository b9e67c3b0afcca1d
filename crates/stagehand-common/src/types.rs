//! Core domain types used throughout the stagehand crates.

use crate::errors::SupervisorError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum length accepted for a stage group name.
pub const MAX_GROUP_NAME_LEN: usize = 128;

/// Stage group name - uniquely identifies a stage group on this host.
///
/// The name doubles as the working directory name under the supervisor's base
/// directory, so it is restricted to characters that cannot escape that
/// directory: ASCII alphanumerics, `-`, `_` and `.` (but never `.` or `..`
/// on its own).
///
/// # Example
/// ```
/// use stagehand_common::GroupName;
///
/// let name = GroupName::parse("ocr").unwrap();
/// assert_eq!(name.as_str(), "ocr");
/// assert!(GroupName::parse("../etc").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GroupName(String);

impl GroupName {
    /// Validates and wraps a group name.
    pub fn parse(name: impl Into<String>) -> Result<Self, SupervisorError> {
        let name = name.into();

        if name.is_empty() {
            return Err(SupervisorError::invalid_group_name(name, "name cannot be empty"));
        }

        if name.len() > MAX_GROUP_NAME_LEN {
            return Err(SupervisorError::invalid_group_name(
                name,
                format!("name too long (max {} characters)", MAX_GROUP_NAME_LEN),
            ));
        }

        if name == "." || name == ".." {
            return Err(SupervisorError::invalid_group_name(
                name,
                "name cannot be a relative directory reference",
            ));
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        {
            return Err(SupervisorError::invalid_group_name(
                name,
                "name can only contain alphanumeric characters, '-', '_' and '.'",
            ));
        }

        Ok(Self(name))
    }

    /// Returns the group name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for GroupName {
    type Error = SupervisorError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl TryFrom<&str> for GroupName {
    type Error = SupervisorError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<GroupName> for String {
    fn from(name: GroupName) -> Self {
        name.0
    }
}

impl AsRef<str> for GroupName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GroupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which of a child's standard output streams a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamType::Stdout => write!(f, "stdout"),
            StreamType::Stderr => write!(f, "stderr"),
        }
    }
}
