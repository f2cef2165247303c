//! Folder descriptors and statistics reported by mail stores

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Folder attribute bitmask as reported by a folder listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FolderAttributes(pub u32);

impl FolderAttributes {
    pub const NONE: Self = Self(0);
    pub const NO_INFERIORS: Self = Self(1);
    pub const NO_SELECT: Self = Self(2);
    pub const MARKED: Self = Self(4);
    pub const UNMARKED: Self = Self(8);
    pub const REFERRAL: Self = Self(16);
    pub const HAS_CHILDREN: Self = Self(32);
    pub const HAS_NO_CHILDREN: Self = Self(64);
    /// Pattern shared by aggregate views such as "All Mail" or "Starred"
    pub const VIRTUAL: Self = Self(32 | 64);

    pub fn bits(self) -> u32 {
        self.0
    }

    /// True when every bit of `other` is set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn is_selectable(self) -> bool {
        !self.contains(Self::NO_SELECT)
    }

    pub fn is_virtual(self) -> bool {
        self.contains(Self::VIRTUAL)
    }
}

impl std::ops::BitOr for FolderAttributes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A folder as discovered by `list_folders`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderDescriptor {
    /// Hierarchical name, possibly prefixed with a `{server}` root
    pub name: String,
    pub attributes: FolderAttributes,
    /// Hierarchy delimiter, if the store has one
    pub delimiter: Option<String>,
}

impl FolderDescriptor {
    pub fn new(name: impl Into<String>, attributes: FolderAttributes) -> Self {
        Self {
            name: name.into(),
            attributes,
            delimiter: Some("/".to_string()),
        }
    }

    pub fn with_delimiter(mut self, delimiter: Option<String>) -> Self {
        self.delimiter = delimiter;
        self
    }
}

/// Statistics for the currently selected folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStat {
    pub message_count: u32,
    /// Name the store uses internally to address this folder
    pub canonical_path: String,
    pub as_of: DateTime<Utc>,
}

impl FolderStat {
    pub fn new(message_count: u32, canonical_path: impl Into<String>) -> Self {
        Self {
            message_count,
            canonical_path: canonical_path.into(),
            as_of: Utc::now(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message_count == 0
    }
}
