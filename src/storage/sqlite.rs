//! SQLite implementation of `LocalStore`.
//!
//! One `records` table keyed `(collection, id)` with the record stored as
//! JSON text. Every `LocalStore` call is a single statement and therefore an
//! independent transaction; the connection is guarded by a
//! `parking_lot::Mutex` since rusqlite connections are not `Sync`.

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use uuid::Uuid;

use crate::error::{LocalError, Result, StoreError};

use super::traits::LocalStore;

fn storage_err(e: rusqlite::Error) -> StoreError {
    StoreError::Local(LocalError::Sqlite(e))
}

pub struct SqliteLocalStore {
    conn: Mutex<Connection>,
}

impl SqliteLocalStore {
    /// Open a file-backed database, creating the schema when absent.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path).map_err(storage_err)?;
        Self::setup(conn)
    }

    /// Open an in-memory database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(storage_err)?;
        Self::setup(conn)
    }

    fn setup(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(storage_err)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS records (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                data       TEXT NOT NULL DEFAULT '{}',
                PRIMARY KEY (collection, id)
            );
             CREATE INDEX IF NOT EXISTS idx_records_collection
                ON records(collection);",
        )
        .map_err(storage_err)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn parse_row(collection: &str, id: &str, data: String) -> Result<Value> {
        serde_json::from_str(&data).map_err(|e| {
            StoreError::Local(LocalError::Corruption {
                collection: collection.to_string(),
                id: id.to_string(),
                message: e.to_string(),
            })
        })
    }

    /// Record id: the caller's non-empty `id` field, or a fresh v4 UUID.
    fn resolve_id(record: &Value) -> String {
        match record.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => Uuid::new_v4().to_string(),
        }
    }

    /// Ensure the stored JSON carries the id it is keyed under.
    fn with_id(record: &Value, id: &str) -> Value {
        let mut out = record.as_object().cloned().unwrap_or_default();
        out.insert("id".to_string(), Value::String(id.to_string()));
        Value::Object(out)
    }
}

impl LocalStore for SqliteLocalStore {
    fn add(&self, collection: &str, record: &Value) -> Result<String> {
        let id = Self::resolve_id(record);
        let data = Self::with_id(record, &id).to_string();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO records (collection, id, data) VALUES (?1, ?2, ?3)",
            params![collection, id, data],
        )
        .map_err(storage_err)?;
        Ok(id)
    }

    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        let conn = self.conn.lock();
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE collection = ?1 AND id = ?2",
                params![collection, key],
                |row| row.get(0),
            )
            .optional()
            .map_err(storage_err)?;

        match data {
            Some(data) => Ok(Some(Self::parse_row(collection, key, data)?)),
            None => Ok(None),
        }
    }

    fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, data FROM records WHERE collection = ?1 ORDER BY rowid")
            .map_err(storage_err)?;

        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(storage_err)?;

        let mut records = Vec::new();
        for row in rows {
            let (id, data) = row.map_err(storage_err)?;
            records.push(Self::parse_row(collection, &id, data)?);
        }
        Ok(records)
    }

    fn update(&self, collection: &str, record: &Value) -> Result<()> {
        let id = match record.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                return Err(StoreError::Local(LocalError::MissingId {
                    operation: "update",
                    collection: collection.to_string(),
                }))
            }
        };
        let data = record.to_string();

        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO records (collection, id, data) VALUES (?1, ?2, ?3)",
            params![collection, id, data],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM records WHERE collection = ?1 AND id = ?2",
            params![collection, key],
        )
        .map_err(storage_err)?;
        Ok(())
    }

    fn clear(&self, collection: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM records WHERE collection = ?1",
            params![collection],
        )
        .map_err(storage_err)?;
        Ok(())
    }
}
