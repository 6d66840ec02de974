//! Height watermark persistence
//!
//! Finalized blocks are stored outside the consensus core. The core only needs
//! to know how far that storage has got, to drop stale deliveries.

use crate::blockchain::Sha256Hash;
use crate::error::{ChainError, Result};
use parking_lot::RwLock;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::Mutex;

/// Source of the locally persisted height.
pub trait HeightSource: Send + Sync {
    fn local_saved_height(&self) -> Result<u64>;

    /// Hash of the block at [`local_saved_height`](Self::local_saved_height),
    /// when the backend knows it.
    fn local_saved_hash(&self) -> Result<Option<Sha256Hash>> {
        Ok(None)
    }

    /// Records that everything up to `height` is persisted.
    fn record_height(&self, height: u64, hash: Sha256Hash) -> Result<()>;
}

/// SQLite-backed watermark, kept in a key/value `metadata` table.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .map_err(|e| ChainError::DatabaseError(format!("Failed to open database: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::DatabaseError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    fn read_metadata(&self, key: &str) -> Result<Option<String>> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let value = conn
            .query_row(
                "SELECT value FROM metadata WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }
}

impl HeightSource for Database {
    fn local_saved_height(&self) -> Result<u64> {
        match self.read_metadata("stored_height")? {
            Some(value) => value.parse().map_err(|e| {
                ChainError::DatabaseError(format!("Corrupt stored_height {:?}: {}", value, e))
            }),
            None => Ok(0),
        }
    }

    fn local_saved_hash(&self) -> Result<Option<Sha256Hash>> {
        let Some(value) = self.read_metadata("stored_hash")? else {
            return Ok(None);
        };
        let bytes = hex::decode(&value)
            .map_err(|e| ChainError::DatabaseError(format!("Corrupt stored_hash: {}", e)))?;
        let hash: Sha256Hash = bytes
            .try_into()
            .map_err(|_| ChainError::DatabaseError("stored_hash is not 32 bytes".to_string()))?;
        Ok(Some(hash))
    }

    fn record_height(&self, height: u64, hash: Sha256Hash) -> Result<()> {
        let conn_guard = self
            .conn
            .lock()
            .map_err(|_| ChainError::DatabaseError("Mutex poisoned".to_string()))?;
        let tx = conn_guard.unchecked_transaction().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to start transaction: {}", e))
        })?;
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('stored_height', ?1)",
            params![height.to_string()],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('stored_hash', ?1)",
            params![hex::encode(hash)],
        )?;
        tx.commit().map_err(|e| {
            ChainError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;
        Ok(())
    }
}

/// Volatile watermark for tests and ephemeral nodes.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    watermark: RwLock<(u64, Option<Sha256Hash>)>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn at_height(height: u64) -> Self {
        Self {
            watermark: RwLock::new((height, None)),
        }
    }
}

impl HeightSource for InMemoryPersistence {
    fn local_saved_height(&self) -> Result<u64> {
        Ok(self.watermark.read().0)
    }

    fn local_saved_hash(&self) -> Result<Option<Sha256Hash>> {
        Ok(self.watermark.read().1)
    }

    fn record_height(&self, height: u64, hash: Sha256Hash) -> Result<()> {
        *self.watermark.write() = (height, Some(hash));
        Ok(())
    }
}
