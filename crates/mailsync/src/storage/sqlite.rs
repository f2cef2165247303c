//! SQLite-based local mail file with zstd-compressed message bodies

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use log::debug;
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::{MailStore, folder_matches};
use crate::error::StoreError;
use crate::models::{FolderAttributes, FolderDescriptor, FolderStat, Message, MessageFlags};

/// zstd level for stored bodies (good balance of speed vs compression)
const COMPRESSION_LEVEL: i32 = 3;

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- One row per folder
            CREATE TABLE mailboxes (
                path TEXT PRIMARY KEY,
                subscribed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            -- Messages; position within a folder is insertion order
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                path TEXT NOT NULL,
                message_id TEXT NOT NULL DEFAULT '',
                internal_date TEXT NOT NULL,
                subject TEXT NOT NULL DEFAULT '',
                body BLOB NOT NULL,  -- zstd compressed
                seen INTEGER NOT NULL DEFAULT 0,
                answered INTEGER NOT NULL DEFAULT 0,
                flagged INTEGER NOT NULL DEFAULT 0,
                draft INTEGER NOT NULL DEFAULT 0,
                recent INTEGER NOT NULL DEFAULT 0,
                deleted INTEGER NOT NULL DEFAULT 0,
                size INTEGER NOT NULL DEFAULT 0,
                FOREIGN KEY (path) REFERENCES mailboxes(path) ON DELETE CASCADE
            );

            CREATE INDEX idx_messages_path ON messages(path, id);
            "#,
        ),
    ])
}

/// Raw column values of one message row
struct MessageRow {
    message_id: String,
    internal_date: String,
    subject: String,
    flags: MessageFlags,
    size: i64,
    body: Option<Vec<u8>>,
}

impl MessageRow {
    fn into_message(self) -> Result<Message> {
        let timestamp = DateTime::parse_from_rfc3339(&self.internal_date)
            .with_context(|| format!("Invalid internal date: {}", self.internal_date))?
            .with_timezone(&Utc);

        let mut builder = Message::builder()
            .identity(self.message_id)
            .timestamp(timestamp)
            .subject(self.subject)
            .flags(self.flags)
            .size(self.size.max(0) as u64);

        if let Some(compressed) = self.body {
            let body =
                zstd::decode_all(compressed.as_slice()).context("Failed to decompress body")?;
            builder = builder.body(body);
        }

        Ok(builder.build())
    }
}

/// Local mail file backed by SQLite
pub struct SqliteMailStore {
    path: PathBuf,
    conn: Option<Connection>,
    selected: Option<String>,
}

impl SqliteMailStore {
    /// Open (or create) a mail file at `db_path`
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let mut conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database at {:?}", path))?;

        // foreign_keys is required for ON DELETE CASCADE
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        debug!("Opened mail file {}", path.display());

        Ok(Self {
            path,
            conn: Some(conn),
            selected: None,
        })
    }

    fn conn(&self) -> Result<&Connection> {
        Ok(self.conn.as_ref().ok_or(StoreError::Closed)?)
    }

    fn selected(&self) -> Result<&str> {
        Ok(self.selected.as_deref().ok_or(StoreError::NoFolderSelected)?)
    }

    fn count(&self, path: &str) -> Result<u32> {
        let count: i64 = self.conn()?.query_row(
            "SELECT COUNT(*) FROM messages WHERE path = ?",
            [path],
            |row| row.get(0),
        )?;
        Ok(count as u32)
    }

    /// Row id of the message at a 1-based position in the selected folder
    fn row_id_at(&self, position: u32) -> Result<i64> {
        let path = self.selected()?;
        let id = if position == 0 {
            None
        } else {
            self.conn()?
                .query_row(
                    "SELECT id FROM messages WHERE path = ? ORDER BY id LIMIT 1 OFFSET ?",
                    params![path, i64::from(position) - 1],
                    |row| row.get::<_, i64>(0),
                )
                .optional()?
        };

        match id {
            Some(id) => Ok(id),
            None => Err(StoreError::PositionOutOfRange {
                position,
                count: self.count(path)?,
            }
            .into()),
        }
    }

    fn load_message(&self, position: u32, with_body: bool) -> Result<Message> {
        let id = self.row_id_at(position)?;
        let sql = if with_body {
            "SELECT message_id, internal_date, subject, seen, answered, flagged, draft,
                    recent, deleted, size, body
             FROM messages WHERE id = ?"
        } else {
            "SELECT message_id, internal_date, subject, seen, answered, flagged, draft,
                    recent, deleted, size, NULL
             FROM messages WHERE id = ?"
        };

        let row = self.conn()?.query_row(sql, [id], |row| {
            Ok(MessageRow {
                message_id: row.get(0)?,
                internal_date: row.get(1)?,
                subject: row.get(2)?,
                flags: MessageFlags {
                    seen: row.get(3)?,
                    answered: row.get(4)?,
                    flagged: row.get(5)?,
                    draft: row.get(6)?,
                    recent: row.get(7)?,
                    deleted: row.get(8)?,
                },
                size: row.get(9)?,
                body: row.get(10)?,
            })
        })?;

        row.into_message()
    }
}

impl MailStore for SqliteMailStore {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    fn list_folders(&mut self, pattern: &str) -> Result<Vec<FolderDescriptor>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT path FROM mailboxes ORDER BY path")?;
        let paths: Vec<String> = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(paths
            .into_iter()
            .filter(|path| folder_matches(pattern, path, '/'))
            .map(|path| FolderDescriptor::new(path, FolderAttributes::HAS_NO_CHILDREN))
            .collect())
    }

    fn list_subscribed(&mut self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT path FROM mailboxes WHERE subscribed = 1 ORDER BY path")?;
        let paths = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(paths)
    }

    fn set_subscribed(&mut self, name: &str, subscribed: bool) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO mailboxes (path, subscribed) VALUES (?1, ?2)
             ON CONFLICT(path) DO UPDATE SET subscribed = excluded.subscribed",
            params![name, subscribed],
        )?;
        Ok(())
    }

    fn select(&mut self, name: &str) -> Result<()> {
        let created = self.conn()?.execute(
            "INSERT OR IGNORE INTO mailboxes (path) VALUES (?)",
            [name],
        )?;
        if created > 0 {
            debug!("Created mailbox {} in {}", name, self.path.display());
        }
        self.selected = Some(name.to_string());
        Ok(())
    }

    fn stat(&mut self) -> Result<FolderStat> {
        let path = self.selected()?;
        Ok(FolderStat::new(self.count(path)?, path))
    }

    fn stat_message(&mut self, position: u32) -> Result<Message> {
        self.load_message(position, false)
    }

    fn get_message(&mut self, position: u32) -> Result<Message> {
        self.load_message(position, true)
    }

    fn put_message(&mut self, message: &Message) -> Result<()> {
        let body = message.body.as_deref().ok_or(StoreError::MissingBody)?;
        let compressed =
            zstd::encode_all(body, COMPRESSION_LEVEL).context("Failed to compress body")?;
        let path = self.selected()?;
        let flags = &message.flags;

        self.conn()?.execute(
            "INSERT INTO messages (path, message_id, internal_date, subject, body,
                                   seen, answered, flagged, draft, recent, deleted, size)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                path,
                message.identity,
                message.timestamp.to_rfc3339(),
                message.subject,
                compressed,
                flags.seen,
                flags.answered,
                flags.flagged,
                flags.draft,
                flags.recent,
                flags.deleted,
                message.size as i64,
            ],
        )?;
        Ok(())
    }

    fn delete_message(&mut self, position: u32) -> Result<()> {
        let id = self.row_id_at(position)?;
        self.conn()?
            .execute("DELETE FROM messages WHERE id = ?", [id])?;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.selected = None;
        if let Some(conn) = self.conn.take() {
            conn.close()
                .map_err(|(_, e)| e)
                .with_context(|| format!("Failed to close {}", self.path.display()))?;
        }
        Ok(())
    }
}
