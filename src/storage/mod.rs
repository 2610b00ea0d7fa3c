//! Persistent local key-value storage.
//!
//! String-valued KV with namespaced keys (`manifest:production`,
//! `credits:<wallet>`, `credits:<wallet>:txs`, `session:beat:<id>`). Two
//! backends behind one trait: SQLite for process-restart persistence and a
//! DashMap store for tests and in-memory operation.
//!
//! Writes only add or fully replace an entry, never partially mutate, so
//! concurrent readers in a single-process model need no coordination beyond
//! what the backend provides.

use dashmap::DashMap;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

/// Error types for storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Storage poisoned: {0}")]
    Poisoned(String),
}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Database(e.to_string())
    }
}

/// Namespaced string key-value store.
pub trait KvStore: Send + Sync {
    /// Read a value.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Write (insert or fully replace) a value.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Remove a value. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StorageError>;

    /// Remove every key under a namespace prefix.
    fn clear_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}

// ============================================================================
// In-memory store
// ============================================================================

/// DashMap-backed store. No persistence across restarts.
#[derive(Default)]
pub struct MemoryKv {
    entries: DashMap<String, String>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let keys: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.key().starts_with(prefix))
            .map(|e| e.key().clone())
            .collect();
        for key in &keys {
            self.entries.remove(key);
        }
        Ok(keys.len())
    }
}

// ============================================================================
// SQLite store
// ============================================================================

/// SQLite-backed store with a single `kv` table.
pub struct SqliteKv {
    db: Mutex<Connection>,
}

impl SqliteKv {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let db = Connection::open(path)?;
        Self::init(db, Some(path))
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self, StorageError> {
        let db = Connection::open_in_memory()?;
        Self::init(db, None)
    }

    fn init(db: Connection, path: Option<&Path>) -> Result<Self, StorageError> {
        // WAL for concurrent read access
        db.execute_batch("PRAGMA journal_mode=WAL;")?;
        db.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
            );",
        )?;

        match path {
            Some(p) => info!(path = %p.display(), "KV store opened"),
            None => info!("KV store opened (in-memory)"),
        }

        Ok(Self { db: Mutex::new(db) })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.db
            .lock()
            .map_err(|e| StorageError::Poisoned(e.to_string()))
    }
}

impl KvStore for SqliteKv {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let db = self.lock()?;
        let mut stmt = db.prepare_cached("SELECT value FROM kv WHERE key = ?1")?;
        match stmt.query_row([key], |row| row.get::<_, String>(0)) {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let db = self.lock()?;
        db.execute(
            "INSERT INTO kv (key, value, updated_at)
             VALUES (?1, ?2, strftime('%s', 'now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = strftime('%s', 'now')",
            rusqlite::params![key, value],
        )?;
        debug!(key, bytes = value.len(), "KV set");
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let db = self.lock()?;
        db.execute("DELETE FROM kv WHERE key = ?1", [key])?;
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let db = self.lock()?;
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let removed = db.execute(
            "DELETE FROM kv WHERE key LIKE ?1 ESCAPE '\\'",
            [pattern.as_str()],
        )?;
        Ok(removed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(store: &dyn KvStore) {
        assert_eq!(store.get("credits:0xabc").unwrap(), None);

        store.set("credits:0xabc", "{\"credits\":10}").unwrap();
        assert_eq!(
            store.get("credits:0xabc").unwrap().as_deref(),
            Some("{\"credits\":10}")
        );

        // full replace
        store.set("credits:0xabc", "{\"credits\":8}").unwrap();
        assert_eq!(
            store.get("credits:0xabc").unwrap().as_deref(),
            Some("{\"credits\":8}")
        );

        store.remove("credits:0xabc").unwrap();
        assert_eq!(store.get("credits:0xabc").unwrap(), None);
        // removing again is fine
        store.remove("credits:0xabc").unwrap();
    }

    #[test]
    fn test_memory_roundtrip() {
        roundtrip(&MemoryKv::new());
    }

    #[test]
    fn test_sqlite_roundtrip() {
        roundtrip(&SqliteKv::open_in_memory().unwrap());
    }

    #[test]
    fn test_clear_prefix_scopes_to_namespace() {
        let store = MemoryKv::new();
        store.set("credits:0xabc", "a").unwrap();
        store.set("credits:0xabc:txs", "b").unwrap();
        store.set("manifest:production", "c").unwrap();

        let removed = store.clear_prefix("credits:").unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("manifest:production").unwrap().as_deref(), Some("c"));
    }

    #[test]
    fn test_sqlite_clear_prefix() {
        let store = SqliteKv::open_in_memory().unwrap();
        store.set("session:beat:1", "a").unwrap();
        store.set("session:beat:2", "b").unwrap();
        store.set("manifest:production", "c").unwrap();

        assert_eq!(store.clear_prefix("session:").unwrap(), 2);
        assert!(store.get("session:beat:1").unwrap().is_none());
        assert!(store.get("manifest:production").unwrap().is_some());
    }
}
