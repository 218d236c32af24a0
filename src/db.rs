use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use crate::saved::KeyValueStore;

const DB_FILENAME: &str = "jobfeed.db";

/// Key-value slots in a single SQLite table.
pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
        let path = data_dir.join(DB_FILENAME);
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let store = Self {
            conn,
            path: Some(path),
        };
        store.init()?;
        Ok(store)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn, path: None };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .with_context(|| format!("Failed to read slot '{}'", key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )
            .with_context(|| format!("Failed to write slot '{}'", key))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::saved::{SavedJobStore, SAVED_JOBS_KEY};

    #[test]
    fn test_get_missing_slot() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.get("nothing").unwrap(), None);
    }

    #[test]
    fn test_set_overwrites_wholesale() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.set("k", "[\"a\"]").unwrap();
        store.set("k", "[]").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn test_saved_jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut saved = SavedJobStore::open(SqliteStore::open(dir.path()).unwrap());
            saved.toggle("77").unwrap();
            saved.toggle("91").unwrap();
            saved.toggle("91").unwrap();
        }

        let backend = SqliteStore::open(dir.path()).unwrap();
        assert_eq!(backend.path(), Some(dir.path().join(DB_FILENAME).as_path()));
        assert_eq!(backend.get(SAVED_JOBS_KEY).unwrap().as_deref(), Some(r#"["77"]"#));

        let saved = SavedJobStore::open(backend);
        assert!(saved.current().contains("77"));
        assert_eq!(saved.current().len(), 1);
    }

    #[test]
    fn test_creates_missing_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        SqliteStore::open(&nested).unwrap();
        assert!(nested.join(DB_FILENAME).exists());
    }
}
