use std::fs;
use std::io;
use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable record of confirmed deletions, keyed by (channel, message).
pub trait DeletionLedger {
    fn has_been_deleted(&self, channel_id: &str, message_id: &str) -> Result<bool, LedgerError>;

    /// Must be idempotent: recording the same pair twice is a no-op.
    fn record_deletion(&self, channel_id: &str, message_id: &str) -> Result<(), LedgerError>;
}

pub struct SqliteLedger {
    conn: Connection,
}

impl SqliteLedger {
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let ledger = Self {
            conn: Connection::open(path)?,
        };
        ledger.init()?;
        Ok(ledger)
    }

    pub fn open_in_memory() -> Result<Self, LedgerError> {
        let ledger = Self {
            conn: Connection::open_in_memory()?,
        };
        ledger.init()?;
        Ok(ledger)
    }

    pub fn init(&self) -> Result<(), LedgerError> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS deleted_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                channel_id TEXT NOT NULL,
                message_id TEXT NOT NULL,
                UNIQUE (channel_id, message_id)
            );",
        )?;
        Ok(())
    }

    pub fn deleted_count(&self, channel_id: &str) -> Result<u64, LedgerError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM deleted_messages WHERE channel_id = ?1",
            params![channel_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    pub fn total_count(&self) -> Result<u64, LedgerError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM deleted_messages", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }
}

impl DeletionLedger for SqliteLedger {
    fn has_been_deleted(&self, channel_id: &str, message_id: &str) -> Result<bool, LedgerError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM deleted_messages WHERE channel_id = ?1 AND message_id = ?2",
                params![channel_id, message_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn record_deletion(&self, channel_id: &str, message_id: &str) -> Result<(), LedgerError> {
        self.conn.execute(
            "INSERT OR IGNORE INTO deleted_messages (channel_id, message_id) VALUES (?1, ?2)",
            params![channel_id, message_id],
        )?;
        Ok(())
    }
}
