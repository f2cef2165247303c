//! Message model shared by every mail store

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Format used for the fallback key and for append dates
/// (e.g. `05-Mar-2021 14:02:11 +0000`).
pub const TIMESTAMP_FORMAT: &str = "%d-%b-%Y %H:%M:%S +0000";

/// Per-message flag set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageFlags {
    pub seen: bool,
    pub answered: bool,
    pub flagged: bool,
    pub draft: bool,
    pub deleted: bool,
    pub recent: bool,
}

/// Key a message is deduplicated by.
///
/// Messages carrying an identity are only ever matched by identity; the
/// canonical timestamp is used for identity-less messages only.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Identity(String),
    Timestamp(String),
}

/// A message as read from a mail store.
///
/// Built once by a store (metadata only, or with the body attached) and not
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message-ID supplied by the originating store, empty when absent
    pub identity: String,
    /// Internal date, truncated to whole seconds
    pub timestamp: DateTime<Utc>,
    /// Subject line (informational)
    pub subject: String,
    pub flags: MessageFlags,
    /// Size in bytes as reported by the store
    pub size: u64,
    /// Raw RFC 822 bytes; only present after a body fetch
    #[serde(skip)]
    pub body: Option<Vec<u8>>,
}

impl Message {
    /// Create a new message builder
    pub fn builder() -> MessageBuilder {
        MessageBuilder::new()
    }

    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }

    /// Timestamp in its canonical string form
    pub fn canonical_timestamp(&self) -> String {
        canonical_timestamp(&self.timestamp)
    }

    /// The key this message is matched by
    pub fn key(&self) -> MessageKey {
        if self.has_identity() {
            MessageKey::Identity(self.identity.clone())
        } else {
            MessageKey::Timestamp(self.canonical_timestamp())
        }
    }

    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }
}

/// Render a timestamp in the canonical `dd-Mon-yyyy HH:MM:SS +0000` form
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    identity: String,
    timestamp: Option<DateTime<Utc>>,
    subject: String,
    flags: MessageFlags,
    size: u64,
    body: Option<Vec<u8>>,
}

impl MessageBuilder {
    fn new() -> Self {
        Self {
            identity: String::new(),
            timestamp: None,
            subject: String::new(),
            flags: MessageFlags::default(),
            size: 0,
            body: None,
        }
    }

    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = identity.into().trim().to_string();
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn flags(mut self, flags: MessageFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn seen(mut self, seen: bool) -> Self {
        self.flags.seen = seen;
        self
    }

    pub fn answered(mut self, answered: bool) -> Self {
        self.flags.answered = answered;
        self
    }

    pub fn flagged(mut self, flagged: bool) -> Self {
        self.flags.flagged = flagged;
        self
    }

    pub fn draft(mut self, draft: bool) -> Self {
        self.flags.draft = draft;
        self
    }

    pub fn deleted(mut self, deleted: bool) -> Self {
        self.flags.deleted = deleted;
        self
    }

    pub fn recent(mut self, recent: bool) -> Self {
        self.flags.recent = recent;
        self
    }

    pub fn size(mut self, size: u64) -> Self {
        self.size = size;
        self
    }

    /// Attach the raw message bytes. The size follows the body unless one
    /// was set explicitly.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        if self.size == 0 {
            self.size = body.len() as u64;
        }
        self.body = Some(body);
        self
    }

    pub fn build(self) -> Message {
        // Second resolution keeps the canonical key stable across stores
        let timestamp = self
            .timestamp
            .and_then(|ts| Utc.timestamp_opt(ts.timestamp(), 0).single())
            .unwrap_or(DateTime::UNIX_EPOCH);

        Message {
            identity: self.identity,
            timestamp,
            subject: self.subject,
            flags: self.flags,
            size: self.size,
            body: self.body,
        }
    }
}
