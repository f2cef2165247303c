//! Error types for reconciliation runs

use std::fmt;
use thiserror::Error;

/// Which of the two stores an error concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Target,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source"),
            Side::Target => f.write_str("target"),
        }
    }
}

/// Errors raised while reconciling two mail stores.
///
/// `Connection`, `Listing`, `FolderSelection` and `Configuration` end the
/// run. `MetadataRead` and `BodyTransfer` are contained to one message: the
/// engine logs them and carries on with the folder.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Failed to connect to {side} store {endpoint}: {source:#}")]
    Connection {
        side: Side,
        endpoint: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to list folders on {side}: {source:#}")]
    Listing {
        side: Side,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to open {side} folder '{folder}': {source:#}")]
    FolderSelection {
        side: Side,
        folder: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to read message {position} in {side} folder '{folder}': {source:#}")]
    MetadataRead {
        side: Side,
        folder: String,
        position: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to copy message {position} from '{folder}': {source:#}")]
    BodyTransfer {
        folder: String,
        position: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl SyncError {
    /// Whether the run can continue after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SyncError::MetadataRead { .. } | SyncError::BodyTransfer { .. }
        )
    }
}

/// Result type for reconciliation runs
pub type SyncResult<T> = Result<T, SyncError>;

/// Conditions a store reports when it is used out of order
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Store is closed")]
    Closed,

    #[error("No folder selected")]
    NoFolderSelected,

    #[error("No message at position {position} (folder has {count})")]
    PositionOutOfRange { position: u32, count: u32 },

    #[error("Message has no body loaded")]
    MissingBody,
}
