//! In-memory storage implementation
//!
//! Used by the test suites and reachable through the `memory:` URI scheme.
//! Every mutating call is recorded in an operation log so tests can assert
//! on exactly what the engine did, and individual calls can be made to fail.

use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use super::{MailStore, folder_matches};
use crate::error::StoreError;
use crate::models::{FolderAttributes, FolderDescriptor, FolderStat, Message};

/// A call recorded by [`InMemoryMailStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Create { folder: String },
    Put { folder: String, identity: String },
    Delete { folder: String, position: u32 },
    Subscribe { folder: String, subscribed: bool },
    Close,
}

struct MemoryFolder {
    attributes: FolderAttributes,
    messages: Vec<Message>,
}

impl MemoryFolder {
    fn new(attributes: FolderAttributes) -> Self {
        Self {
            attributes,
            messages: Vec::new(),
        }
    }
}

/// Calls that should fail, keyed by folder and position at call time
#[derive(Default)]
struct Failures {
    metadata: HashSet<(String, u32)>,
    body: HashSet<(String, u32)>,
    select: HashSet<String>,
    appends: bool,
}

/// In-memory implementation of MailStore
pub struct InMemoryMailStore {
    name: String,
    folders: BTreeMap<String, MemoryFolder>,
    subscribed: BTreeSet<String>,
    selected: Option<String>,
    ops: Vec<StoreOp>,
    failures: Failures,
}

impl InMemoryMailStore {
    /// Create a new empty in-memory store
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            folders: BTreeMap::new(),
            subscribed: BTreeSet::new(),
            selected: None,
            ops: Vec::new(),
            failures: Failures::default(),
        }
    }

    /// Add (or re-flag) a folder without recording an operation
    pub fn add_folder(&mut self, name: &str, attributes: FolderAttributes) {
        self.folders
            .entry(name.to_string())
            .or_insert_with(|| MemoryFolder::new(attributes))
            .attributes = attributes;
    }

    /// Append a message directly, creating the folder if needed
    pub fn add_message(&mut self, folder: &str, message: Message) {
        self.folders
            .entry(folder.to_string())
            .or_insert_with(|| MemoryFolder::new(FolderAttributes::HAS_NO_CHILDREN))
            .messages
            .push(message);
    }

    /// Mark a folder as subscribed without recording an operation
    pub fn subscribe(&mut self, folder: &str) {
        self.subscribed.insert(folder.to_string());
    }

    pub fn is_subscribed(&self, folder: &str) -> bool {
        self.subscribed.contains(folder)
    }

    pub fn has_folder(&self, folder: &str) -> bool {
        self.folders.contains_key(folder)
    }

    /// Messages currently stored in `folder`, in position order
    pub fn messages(&self, folder: &str) -> &[Message] {
        self.folders
            .get(folder)
            .map(|f| f.messages.as_slice())
            .unwrap_or(&[])
    }

    /// Identities of the messages in `folder`, in position order
    pub fn identities(&self, folder: &str) -> Vec<String> {
        self.messages(folder)
            .iter()
            .map(|m| m.identity.clone())
            .collect()
    }

    /// Every mutating call made so far
    pub fn ops(&self) -> &[StoreOp] {
        &self.ops
    }

    pub fn clear_ops(&mut self) {
        self.ops.clear();
    }

    /// Number of times `close` has been called
    pub fn close_count(&self) -> usize {
        self.ops.iter().filter(|op| **op == StoreOp::Close).count()
    }

    /// Make `stat_message` fail for `position` in `folder`
    pub fn fail_metadata_at(&mut self, folder: &str, position: u32) {
        self.failures.metadata.insert((folder.to_string(), position));
    }

    /// Make `get_message` fail for `position` in `folder`
    pub fn fail_body_at(&mut self, folder: &str, position: u32) {
        self.failures.body.insert((folder.to_string(), position));
    }

    /// Make `select` fail for `folder`
    pub fn fail_select(&mut self, folder: &str) {
        self.failures.select.insert(folder.to_string());
    }

    /// Make every `put_message` fail
    pub fn fail_appends(&mut self, fail: bool) {
        self.failures.appends = fail;
    }

    fn selected_folder(&self) -> Result<(&str, &MemoryFolder)> {
        let name = self.selected.as_deref().ok_or(StoreError::NoFolderSelected)?;
        let folder = self
            .folders
            .get(name)
            .ok_or(StoreError::NoFolderSelected)?;
        Ok((name, folder))
    }

    fn message_at(&self, position: u32) -> Result<(&str, &Message)> {
        let (name, folder) = self.selected_folder()?;
        let count = folder.messages.len() as u32;
        if position == 0 || position > count {
            return Err(StoreError::PositionOutOfRange { position, count }.into());
        }
        Ok((name, &folder.messages[position as usize - 1]))
    }
}

impl MailStore for InMemoryMailStore {
    fn describe(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn list_folders(&mut self, pattern: &str) -> Result<Vec<FolderDescriptor>> {
        Ok(self
            .folders
            .iter()
            .filter(|(name, _)| folder_matches(pattern, name, '/'))
            .map(|(name, folder)| FolderDescriptor::new(name.clone(), folder.attributes))
            .collect())
    }

    fn list_subscribed(&mut self) -> Result<Vec<String>> {
        Ok(self.subscribed.iter().cloned().collect())
    }

    fn set_subscribed(&mut self, name: &str, subscribed: bool) -> Result<()> {
        if subscribed {
            self.subscribed.insert(name.to_string());
        } else {
            self.subscribed.remove(name);
        }
        self.ops.push(StoreOp::Subscribe {
            folder: name.to_string(),
            subscribed,
        });
        Ok(())
    }

    fn select(&mut self, name: &str) -> Result<()> {
        if self.failures.select.contains(name) {
            bail!("cannot open folder {}", name);
        }
        if !self.folders.contains_key(name) {
            self.folders.insert(
                name.to_string(),
                MemoryFolder::new(FolderAttributes::HAS_NO_CHILDREN),
            );
            self.ops.push(StoreOp::Create {
                folder: name.to_string(),
            });
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    fn stat(&mut self) -> Result<FolderStat> {
        let (name, folder) = self.selected_folder()?;
        Ok(FolderStat::new(folder.messages.len() as u32, name))
    }

    fn stat_message(&mut self, position: u32) -> Result<Message> {
        let (name, message) = self.message_at(position)?;
        if self.failures.metadata.contains(&(name.to_string(), position)) {
            bail!("metadata unavailable");
        }
        let mut meta = message.clone();
        meta.body = None;
        Ok(meta)
    }

    fn get_message(&mut self, position: u32) -> Result<Message> {
        let (name, message) = self.message_at(position)?;
        if self.failures.body.contains(&(name.to_string(), position)) {
            bail!("body unavailable");
        }
        let mut full = message.clone();
        if full.body.is_none() {
            full.body = Some(Vec::new());
        }
        Ok(full)
    }

    fn put_message(&mut self, message: &Message) -> Result<()> {
        if self.failures.appends {
            bail!("append rejected");
        }
        if !message.has_body() {
            return Err(StoreError::MissingBody.into());
        }
        let name = self.selected_folder()?.0.to_string();
        self.ops.push(StoreOp::Put {
            folder: name.clone(),
            identity: message.identity.clone(),
        });
        if let Some(folder) = self.folders.get_mut(&name) {
            folder.messages.push(message.clone());
        }
        Ok(())
    }

    fn delete_message(&mut self, position: u32) -> Result<()> {
        let name = self.message_at(position)?.0.to_string();
        if let Some(folder) = self.folders.get_mut(&name) {
            folder.messages.remove(position as usize - 1);
        }
        self.ops.push(StoreOp::Delete {
            folder: name,
            position,
        });
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.selected = None;
        self.ops.push(StoreOp::Close);
        Ok(())
    }
}
