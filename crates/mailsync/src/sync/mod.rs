//! Sync engine for reconciling two mail stores
//!
//! Runs are idempotent: a second run without `wipe` or `sync` copies
//! nothing, so an interrupted run can simply be repeated.

mod engine;
mod index;
mod mode;
mod report;
mod selector;

pub use engine::{SyncOptions, SyncProgress, reconcile};
pub use index::{IndexEntry, KeySet, MailboxIndex};
pub use mode::{RunMode, RunModeBuilder};
pub use report::{Counts, FolderReport, RunReport, StopReason};
pub use selector::{DEFAULT_SKIPPED_FOLDERS, FolderSelector};
