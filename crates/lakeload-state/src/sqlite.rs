//! `SQLite`-backed implementation of [`CheckpointStore`].
//!
//! Uses a single `Mutex<Connection>` for thread safety.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use lakeload_types::checkpoint::{Checkpoint, CheckpointKey, CHECKPOINT_FORMAT};
use rusqlite::{Connection, OptionalExtension};

use crate::backend::CheckpointStore;
use crate::error::{self, StateError};

/// Idempotent DDL for the checkpoint table.
const CREATE_TABLES: &str = r"
CREATE TABLE IF NOT EXISTS checkpoints (
    key TEXT PRIMARY KEY,
    checkpoint TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// `SQLite` checkpoint storage.
///
/// Create with [`SqliteCheckpointStore::open`] for file-backed persistence
/// or [`SqliteCheckpointStore::in_memory`] for tests.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
    label: String,
}

impl SqliteCheckpointStore {
    /// Open or create a `SQLite` checkpoint database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Io`] if the directory can't be created,
    /// or [`StateError::Sqlite`] if the database can't be opened.
    pub fn open(path: &Path) -> error::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            label: path.display().to_string(),
        })
    }

    /// Create an in-memory `SQLite` store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Sqlite`] if the in-memory database can't
    /// be initialized.
    pub fn in_memory() -> error::Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self {
            conn: Mutex::new(conn),
            label: ":memory:".to_string(),
        })
    }

    /// Acquire the connection lock.
    fn lock_conn(&self) -> error::Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StateError::LockPoisoned)
    }

    #[cfg(test)]
    fn raw_value(&self, key: &str) -> error::Result<Option<String>> {
        let conn = self.lock_conn()?;
        Ok(conn
            .query_row(
                "SELECT checkpoint FROM checkpoints WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?)
    }
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn get_checkpoint(&self, key: &CheckpointKey) -> error::Result<Option<Checkpoint>> {
        let conn = self.lock_conn()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT checkpoint FROM checkpoints WHERE key = ?1",
                [key.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|value| {
            value.parse::<Checkpoint>().map_err(|e| StateError::Corrupt {
                key: key.to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()
    }

    async fn set_checkpoint(
        &self,
        key: &CheckpointKey,
        checkpoint: Checkpoint,
    ) -> error::Result<()> {
        let conn = self.lock_conn()?;
        let now = Utc::now().format(CHECKPOINT_FORMAT).to_string();
        conn.execute(
            "INSERT INTO checkpoints (key, checkpoint, updated_at) VALUES (?1, ?2, ?3) \
             ON CONFLICT(key) DO UPDATE SET checkpoint = ?2, updated_at = ?3",
            rusqlite::params![key.as_str(), checkpoint.format(), now],
        )?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("sqlite({})", self.label)
    }
}
