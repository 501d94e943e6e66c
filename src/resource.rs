//! Hierarchical resource paths.
//!
//! A [`Resource`] names an operation type (`/storage/volume/create`) or a
//! path-like argument (`/cluster/rg`). Resources compare by their path string.

use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An immutable path string such as `/storage/volume`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Resource(String);

impl Resource {
    /// Create a resource from any string. Every string is a valid resource.
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The original path string
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check if the path is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Non-empty path segments, in order.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Check whether `other` lies at or below this resource.
    ///
    /// Comparison is segment-wise, so `/stor` does not contain `/storage`.
    pub fn contains(&self, other: &Resource) -> bool {
        let mut theirs = other.segments();
        self.segments().all(|ours| theirs.next() == Some(ours))
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Resource {
    type Err = Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Resource {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for Resource {
    fn from(path: String) -> Self {
        Self(path)
    }
}

impl From<&Resource> for Resource {
    fn from(resource: &Resource) -> Self {
        resource.clone()
    }
}

impl AsRef<str> for Resource {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
