//! Per-folder deduplication index

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::models::{Message, MessageKey};
use crate::storage::MailStore;

/// What the index remembers about one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub subject: String,
    pub timestamp: DateTime<Utc>,
    /// 1-based position at build time
    pub position: u32,
}

/// Lookup over one folder's contents.
///
/// Messages with an identity go into `by_identity`, all others into
/// `by_timestamp`; a message is never in both. A later position with the
/// same key replaces the earlier entry. Positions are valid until the
/// folder is next mutated.
#[derive(Debug, Default)]
pub struct MailboxIndex {
    by_identity: HashMap<String, IndexEntry>,
    by_timestamp: HashMap<String, IndexEntry>,
}

impl MailboxIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index positions `1..=count` of the selected folder, metadata only.
    ///
    /// `on_progress` receives the number of messages indexed so far.
    pub fn build<F>(store: &mut dyn MailStore, count: u32, mut on_progress: F) -> Result<Self>
    where
        F: FnMut(u32),
    {
        let mut index = Self::new();
        for position in 1..=count {
            let message = store.stat_message(position)?;
            index.insert(&message, position);
            on_progress(position);
        }
        Ok(index)
    }

    pub fn insert(&mut self, message: &Message, position: u32) {
        let entry = IndexEntry {
            subject: message.subject.clone(),
            timestamp: message.timestamp,
            position,
        };
        match message.key() {
            MessageKey::Identity(id) => self.by_identity.insert(id, entry),
            MessageKey::Timestamp(ts) => self.by_timestamp.insert(ts, entry),
        };
    }

    /// Look a key up in its own key space only
    pub fn lookup(&self, key: &MessageKey) -> Option<&IndexEntry> {
        match key {
            MessageKey::Identity(id) => self.by_identity.get(id),
            MessageKey::Timestamp(ts) => self.by_timestamp.get(ts),
        }
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        self.lookup(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.by_identity.len() + self.by_timestamp.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose key is not in `seen`, highest position first
    pub fn surplus(&self, seen: &KeySet) -> Vec<(MessageKey, &IndexEntry)> {
        let mut out: Vec<(MessageKey, &IndexEntry)> = self
            .by_identity
            .iter()
            .map(|(id, entry)| (MessageKey::Identity(id.clone()), entry))
            .chain(
                self.by_timestamp
                    .iter()
                    .map(|(ts, entry)| (MessageKey::Timestamp(ts.clone()), entry)),
            )
            .filter(|(key, _)| !seen.contains(key))
            .collect();
        out.sort_by(|a, b| b.1.position.cmp(&a.1.position));
        out
    }
}

/// Keys seen while walking a folder, split by key space
#[derive(Debug, Default)]
pub struct KeySet {
    identities: HashSet<String>,
    timestamps: HashSet<String>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: MessageKey) {
        match key {
            MessageKey::Identity(id) => self.identities.insert(id),
            MessageKey::Timestamp(ts) => self.timestamps.insert(ts),
        };
    }

    pub fn contains(&self, key: &MessageKey) -> bool {
        match key {
            MessageKey::Identity(id) => self.identities.contains(id),
            MessageKey::Timestamp(ts) => self.timestamps.contains(ts),
        }
    }

    pub fn len(&self) -> usize {
        self.identities.len() + self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
