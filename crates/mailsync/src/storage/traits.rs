//! Storage trait definitions

use crate::models::{FolderDescriptor, FolderStat, Message};
use anyhow::Result;

/// Trait for mail store operations
///
/// Implemented once per backend (IMAP server, SQLite file, in-memory) and
/// consumed unmodified by the sync engine. Messages are addressed by their
/// 1-based position in the currently selected folder; positions are only
/// valid until the next mutation of that folder.
pub trait MailStore {
    /// Short human-readable description of the store (for logs)
    fn describe(&self) -> String;

    /// List folders matching `pattern` (`*` = all, `%` = one level)
    fn list_folders(&mut self, pattern: &str) -> Result<Vec<FolderDescriptor>>;

    /// Names of the folders currently subscribed
    fn list_subscribed(&mut self) -> Result<Vec<String>>;

    /// Subscribe or unsubscribe a folder. Idempotent.
    fn set_subscribed(&mut self, name: &str, subscribed: bool) -> Result<()>;

    /// Select a folder, creating it first when it does not exist
    fn select(&mut self, name: &str) -> Result<()>;

    /// Statistics for the selected folder
    fn stat(&mut self) -> Result<FolderStat>;

    /// Message metadata at `position`, without the body
    fn stat_message(&mut self, position: u32) -> Result<Message>;

    /// Message at `position` with its body populated
    fn get_message(&mut self, position: u32) -> Result<Message>;

    /// Append a message (flags and timestamp preserved) to the selected folder
    fn put_message(&mut self, message: &Message) -> Result<()>;

    /// Remove the message at `position`. Later positions shift down by one.
    fn delete_message(&mut self, position: u32) -> Result<()>;

    /// Release all resources. Idempotent.
    fn close(&mut self) -> Result<()>;
}
