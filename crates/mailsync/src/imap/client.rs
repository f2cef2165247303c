//! IMAP-backed mail store
//!
//! Uses the blocking `imap` client over native-tls so the sync engine can
//! stay synchronous.

use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, FixedOffset, Utc};
use log::{debug, info, warn};
use native_tls::{TlsConnector, TlsStream};
use std::collections::HashSet;
use std::net::TcpStream;

use super::normalize::{flags_to_imap, folder_from_name, message_from_fetch};
use crate::config::{ImapEndpoint, Security};
use crate::error::StoreError;
use crate::models::{FolderDescriptor, FolderStat, Message};
use crate::storage::MailStore;

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// Metadata only; never touches the body
const METADATA_QUERY: &str = "(FLAGS INTERNALDATE RFC822.SIZE ENVELOPE)";
/// PEEK keeps the source's \Seen state untouched
const FULL_QUERY: &str = "(FLAGS INTERNALDATE RFC822.SIZE ENVELOPE BODY.PEEK[])";
/// Some servers reject empty APPENDs outright
const EMPTY_BODY: &[u8] = b"<empty msg>";

/// Attach a description to an IMAP error
trait ImapContext<T> {
    fn imap_context<F: FnOnce() -> String>(self, what: F) -> Result<T>;
}

impl<T> ImapContext<T> for Result<T, imap::Error> {
    fn imap_context<F: FnOnce() -> String>(self, what: F) -> Result<T> {
        self.map_err(|e| anyhow!("{}: {}", what(), e))
    }
}

struct SelectedFolder {
    name: String,
    encoded: String,
    exists: u32,
    as_of: DateTime<Utc>,
}

/// Mail store on an IMAP server
pub struct ImapMailStore {
    endpoint: ImapEndpoint,
    session: Option<TlsSession>,
    /// Open folders with EXAMINE and never create them
    read_only: bool,
    /// Decoded names of folders known to exist
    known_folders: HashSet<String>,
    selected: Option<SelectedFolder>,
    /// Server advertises UID EXPUNGE
    uidplus: bool,
}

impl ImapMailStore {
    /// Connect and log in
    pub fn connect(endpoint: &ImapEndpoint, read_only: bool) -> Result<Self> {
        let tls = TlsConnector::builder()
            .danger_accept_invalid_certs(endpoint.accept_invalid_certs)
            .danger_accept_invalid_hostnames(endpoint.accept_invalid_certs)
            .build()
            .context("TLS connector build failed")?;

        let addr = (endpoint.host.as_str(), endpoint.port);
        info!(
            "Connecting to {}:{} as {}{}",
            endpoint.host,
            endpoint.port,
            endpoint.user,
            if read_only { " (read-only)" } else { "" }
        );

        let client = match endpoint.security {
            Security::Ssl => imap::connect(addr, &endpoint.host, &tls),
            Security::StartTls => imap::connect_starttls(addr, &endpoint.host, &tls),
        }
        .imap_context(|| format!("IMAP connection to {}:{} failed", endpoint.host, endpoint.port))?;

        let mut session = client
            .login(&endpoint.user, &endpoint.password)
            .map_err(|(e, _)| anyhow!("IMAP login as {} failed: {}", endpoint.user, e))?;

        let uidplus = session
            .capabilities()
            .imap_context(|| "CAPABILITY failed".to_string())?
            .has_str("UIDPLUS");
        if !uidplus && !read_only {
            warn!("{} lacks UIDPLUS; messages cannot be deleted", endpoint.host);
        }

        let mut store = Self {
            endpoint: endpoint.clone(),
            session: Some(session),
            read_only,
            known_folders: HashSet::new(),
            selected: None,
            uidplus,
        };
        // Remember what exists so select() knows when to CREATE
        store.list_folders("*")?;
        Ok(store)
    }

    fn session(&mut self) -> Result<&mut TlsSession> {
        Ok(self.session.as_mut().ok_or(StoreError::Closed)?)
    }

    fn selected(&self) -> Result<&SelectedFolder> {
        Ok(self.selected.as_ref().ok_or(StoreError::NoFolderSelected)?)
    }

    fn check_position(&self, position: u32) -> Result<()> {
        let count = self.selected()?.exists;
        if position == 0 || position > count {
            return Err(StoreError::PositionOutOfRange { position, count }.into());
        }
        Ok(())
    }

    fn fetch_one(&mut self, position: u32, query: &str, with_body: bool) -> Result<Message> {
        self.check_position(position)?;
        let fetches = self
            .session()?
            .fetch(position.to_string(), query)
            .imap_context(|| format!("FETCH {} failed", position))?;

        let fetch = fetches
            .iter()
            .find(|f| f.message == position)
            .ok_or_else(|| anyhow!("Server returned no data for message {}", position))?;
        message_from_fetch(fetch, with_body)
    }

    fn uid_at(&mut self, position: u32) -> Result<u32> {
        let fetches = self
            .session()?
            .fetch(position.to_string(), "UID")
            .imap_context(|| format!("FETCH UID of {} failed", position))?;
        fetches
            .iter()
            .find(|f| f.message == position)
            .and_then(|f| f.uid)
            .ok_or_else(|| anyhow!("Server returned no UID for message {}", position))
    }
}

/// Deleting needs a writable folder and UID EXPUNGE; a plain EXPUNGE
/// would also remove every other message already flagged \Deleted.
fn check_can_delete(read_only: bool, uidplus: bool, host: &str) -> Result<()> {
    if read_only {
        return Err(anyhow!("Mailbox on {} is open read-only", host));
    }
    if !uidplus {
        return Err(anyhow!(
            "{} does not support UIDPLUS; refusing to expunge",
            host
        ));
    }
    Ok(())
}

/// Message count once the server reported `expunged` sequence numbers
fn count_after_expunge(exists: u32, expunged: &[u32]) -> u32 {
    exists.saturating_sub(u32::try_from(expunged.len()).unwrap_or(u32::MAX))
}

/// Server-side name of a folder; INBOX is case-insensitive
fn mailbox_name(name: &str) -> String {
    let trimmed = name.trim_matches('/');
    if trimmed.eq_ignore_ascii_case("inbox") {
        "INBOX".to_string()
    } else {
        trimmed.to_string()
    }
}

impl MailStore for ImapMailStore {
    fn describe(&self) -> String {
        format!(
            "imap://{}@{}:{}",
            self.endpoint.user, self.endpoint.host, self.endpoint.port
        )
    }

    fn list_folders(&mut self, pattern: &str) -> Result<Vec<FolderDescriptor>> {
        let names = self
            .session()?
            .list(Some(""), Some(pattern))
            .imap_context(|| format!("LIST {} failed", pattern))?;

        let folders: Vec<FolderDescriptor> = names.iter().map(folder_from_name).collect();
        self.known_folders
            .extend(folders.iter().map(|f| mailbox_name(&f.name)));
        Ok(folders)
    }

    fn list_subscribed(&mut self) -> Result<Vec<String>> {
        let names = self
            .session()?
            .lsub(Some(""), Some("*"))
            .imap_context(|| "LSUB failed".to_string())?;
        Ok(names
            .iter()
            .map(|n| utf7_imap::decode_utf7_imap(n.name().to_string()))
            .collect())
    }

    fn set_subscribed(&mut self, name: &str, subscribed: bool) -> Result<()> {
        let encoded = utf7_imap::encode_utf7_imap(mailbox_name(name));
        let session = self.session()?;
        let result = if subscribed {
            session.subscribe(&encoded)
        } else {
            session.unsubscribe(&encoded)
        };

        match result {
            Ok(()) => Ok(()),
            // Already in the requested state
            Err(imap::Error::No(reason)) => {
                debug!("Subscription change for {} refused: {}", name, reason);
                Ok(())
            }
            Err(e) => Err(anyhow!("Subscription change for {} failed: {}", name, e)),
        }
    }

    fn select(&mut self, name: &str) -> Result<()> {
        let mailbox = mailbox_name(name);
        let encoded = utf7_imap::encode_utf7_imap(mailbox.clone());
        let read_only = self.read_only;

        if !read_only && !self.known_folders.contains(&mailbox) {
            info!("Creating mailbox: {}", mailbox);
            if let Err(e) = self.session()?.create(&encoded) {
                // It may exist without having been listed; SELECT decides
                warn!("CREATE {} failed: {}", mailbox, e);
            }
            self.known_folders.insert(mailbox.clone());
        }

        let session = self.session()?;
        let opened = if read_only {
            session.examine(&encoded)
        } else {
            session.select(&encoded)
        }
        .imap_context(|| format!("Cannot open mailbox {}", mailbox))?;

        debug!("Opened {} ({} messages)", mailbox, opened.exists);
        self.selected = Some(SelectedFolder {
            name: mailbox,
            encoded,
            exists: opened.exists,
            as_of: Utc::now(),
        });
        Ok(())
    }

    fn stat(&mut self) -> Result<FolderStat> {
        let selected = self.selected()?;
        Ok(FolderStat {
            message_count: selected.exists,
            canonical_path: selected.encoded.clone(),
            as_of: selected.as_of,
        })
    }

    fn stat_message(&mut self, position: u32) -> Result<Message> {
        self.fetch_one(position, METADATA_QUERY, false)
    }

    fn get_message(&mut self, position: u32) -> Result<Message> {
        self.fetch_one(position, FULL_QUERY, true)
    }

    fn put_message(&mut self, message: &Message) -> Result<()> {
        let body = message.body.as_deref().ok_or(StoreError::MissingBody)?;
        let body = if body.is_empty() { EMPTY_BODY } else { body };
        let mailbox = self.selected()?.encoded.clone();
        let flags = flags_to_imap(&message.flags);
        let date = DateTime::<FixedOffset>::from(message.timestamp);

        self.session()?
            .append_with_flags_and_date(&mailbox, body, &flags, Some(date))
            .imap_context(|| format!("APPEND to {} failed", mailbox))?;

        if let Some(selected) = self.selected.as_mut() {
            selected.exists += 1;
        }
        Ok(())
    }

    fn delete_message(&mut self, position: u32) -> Result<()> {
        check_can_delete(self.read_only, self.uidplus, &self.endpoint.host)?;
        self.check_position(position)?;
        let uid = self.uid_at(position)?.to_string();

        let session = self.session()?;
        session
            .uid_store(&uid, "+FLAGS.SILENT (\\Deleted)")
            .imap_context(|| format!("UID STORE \\Deleted on {} failed", uid))?;
        let expunged = session
            .uid_expunge(&uid)
            .imap_context(|| format!("UID EXPUNGE {} failed", uid))?;

        if let Some(selected) = self.selected.as_mut() {
            selected.exists = count_after_expunge(selected.exists, &expunged);
            debug!(
                "Expunged message {} (UID {}) from {}, {} left",
                position, uid, selected.name, selected.exists
            );
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.selected = None;
        if let Some(mut session) = self.session.take() {
            info!("Logging out of {}", self.endpoint.host);
            session
                .logout()
                .imap_context(|| format!("LOGOUT from {} failed", self.endpoint.host))?;
        }
        Ok(())
    }
}

impl Drop for ImapMailStore {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            debug!("Error closing IMAP session: {:#}", e);
        }
    }
}
