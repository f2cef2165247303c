//! Opening a mail store from an endpoint

use log::info;

use crate::config::Endpoint;
use crate::error::{Side, SyncError, SyncResult};
use crate::imap::ImapMailStore;
use crate::storage::{InMemoryMailStore, MailStore, SqliteMailStore};

/// Open the store an endpoint points at.
///
/// `read_only` opens IMAP folders with EXAMINE and never creates them.
pub fn open_store(endpoint: &Endpoint, side: Side, read_only: bool) -> SyncResult<Box<dyn MailStore>> {
    info!("Connecting {} {}", side, endpoint.redacted());

    let store: anyhow::Result<Box<dyn MailStore>> = match endpoint {
        Endpoint::Imap(imap) => {
            ImapMailStore::connect(imap, read_only).map(|s| Box::new(s) as Box<dyn MailStore>)
        }
        Endpoint::File(path) => {
            SqliteMailStore::open(path).map(|s| Box::new(s) as Box<dyn MailStore>)
        }
        Endpoint::Memory(name) => Ok(Box::new(InMemoryMailStore::new(name.clone()))),
    };

    store.map_err(|source| SyncError::Connection {
        side,
        endpoint: endpoint.redacted(),
        source,
    })
}
