//! Mailsync - reconciliation of two mail stores
//!
//! This crate provides the pieces behind the `mailmove` tool:
//! - Domain models (Message, FolderDescriptor, FolderStat)
//! - The MailStore trait with IMAP, SQLite and in-memory backends
//! - Store URIs and the JSON config file
//! - The reconciliation engine (folder skip policy, dual-key index,
//!   copy / wipe / sync decisions)
//!
//! Everything is synchronous; a run uses one connection per store.

pub mod config;
pub mod connect;
pub mod error;
pub mod imap;
pub mod models;
pub mod storage;
pub mod sync;

pub use crate::config::{Endpoint, ImapEndpoint, MoveConfig, Security};
pub use connect::open_store;
pub use error::{Side, StoreError, SyncError, SyncResult};
pub use crate::imap::ImapMailStore;
pub use models::{
    FolderAttributes, FolderDescriptor, FolderStat, Message, MessageBuilder, MessageFlags,
    MessageKey,
};
pub use storage::{InMemoryMailStore, MailStore, SqliteMailStore, StoreOp};
pub use sync::{
    Counts, FolderReport, FolderSelector, MailboxIndex, RunMode, RunReport, StopReason,
    SyncOptions, SyncProgress, reconcile,
};
