//! Shared test support: an in-memory `RemoteStore` with failure switches
//! and call counters, plus adapter construction helpers.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

use wirestore::collections::{self, remote_key_field, remote_table};
use wirestore::config::{AdapterConfig, MemorySettings, SettingsPort, MODE_KEY};
use wirestore::error::{RemoteError, Result, StoreError};
use wirestore::storage::adapter::StorageAdapter;
use wirestore::storage::sqlite::SqliteLocalStore;
use wirestore::storage::traits::RemoteStore;
use wirestore::transform;

// ============================================================================
// MockRemote
// ============================================================================

#[derive(Default)]
struct MockRemoteInner {
    /// Rows per collection, stored in the remote (snake_case) shape.
    tables: HashMap<String, Vec<Value>>,
}

/// In-memory remote store. Rows are held in their remote column shape so
/// soft-delete markers and key handling behave like the real backend.
#[derive(Default)]
pub struct MockRemote {
    inner: Mutex<MockRemoteInner>,
    fail_initialize: AtomicBool,
    fail_writes: AtomicBool,
    get_calls: AtomicUsize,
    add_calls: AtomicUsize,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_fail_initialize(&self, fail: bool) {
        self.fail_initialize.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Insert a raw remote-shape row, bypassing transforms and checks.
    pub fn seed_row(&self, collection: &str, row: Value) {
        self.inner
            .lock()
            .tables
            .entry(Self::table_key(collection))
            .or_default()
            .push(row);
    }

    /// Raw rows currently stored for a collection.
    pub fn rows(&self, collection: &str) -> Vec<Value> {
        self.inner
            .lock()
            .tables
            .get(&Self::table_key(collection))
            .cloned()
            .unwrap_or_default()
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn add_calls(&self) -> usize {
        self.add_calls.load(Ordering::SeqCst)
    }

    fn check_writes(&self, table: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(RemoteError::Api {
                table: table.to_string(),
                status: 503,
                message: "simulated outage".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn table_for(collection: &str) -> Result<&'static str> {
        remote_table(collection)
            .ok_or_else(|| RemoteError::UnknownCollection(collection.to_string()).into())
    }

    /// Internal storage key for a collection or table name. Rows live under
    /// their remote (snake_case) table name, mirroring the real backend:
    /// a collection name is mapped through `remote_table`, while a value
    /// that is already a table name passes through unchanged.
    fn table_key(name: &str) -> String {
        remote_table(name)
            .map(|t| t.to_string())
            .unwrap_or_else(|| name.to_string())
    }

    fn is_live(row: &Value) -> bool {
        matches!(row.get("deleted_at"), None | Some(Value::Null))
    }
}

#[async_trait]
impl RemoteStore for MockRemote {
    async fn initialize(&self) -> Result<()> {
        if self.fail_initialize.load(Ordering::SeqCst) {
            return Err(RemoteError::Auth("simulated bad credentials".to_string()).into());
        }
        Ok(())
    }

    async fn add(&self, collection: &str, record: &Value) -> Result<String> {
        let table = Self::table_for(collection)?;
        self.check_writes(table)?;
        self.add_calls.fetch_add(1, Ordering::SeqCst);

        let mut row = transform::outbound(collection, record)
            .as_object()
            .cloned()
            .unwrap_or_default();

        let key = if collection == collections::SETTINGS {
            match row.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => {
                    return Err(RemoteError::MissingKey {
                        operation: "add",
                        collection: collection.to_string(),
                        field: "name",
                    }
                    .into())
                }
            }
        } else {
            let id = Uuid::new_v4().to_string();
            row.insert("id".to_string(), Value::String(id.clone()));
            id
        };

        self.seed_row(collection, Value::Object(row));
        Ok(key)
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        Self::table_for(collection)?;
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let key_field = remote_key_field(collection);

        let inner = self.inner.lock();
        let row = inner
            .tables
            .get(&Self::table_key(collection))
            .and_then(|rows| {
                rows.iter().find(|row| {
                    Self::is_live(row)
                        && row.get(key_field).and_then(Value::as_str) == Some(key)
                })
            })
            .cloned();
        Ok(row.map(|row| transform::inbound(collection, &row)))
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        Self::table_for(collection)?;
        self.get_calls.fetch_add(1, Ordering::SeqCst);

        let inner = self.inner.lock();
        Ok(inner
            .tables
            .get(&Self::table_key(collection))
            .map(|rows| {
                rows.iter()
                    .filter(|row| Self::is_live(row))
                    .map(|row| transform::inbound(collection, row))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add_batch(&self, collection: &str, rows: &[Value]) -> Result<usize> {
        let table = Self::table_for(collection)?;
        self.check_writes(table)?;

        let mut inner = self.inner.lock();
        let stored = inner.tables.entry(Self::table_key(collection)).or_default();
        for row in rows {
            stored.push(row.clone());
        }
        Ok(rows.len())
    }

    async fn update(&self, collection: &str, record: &Value) -> Result<()> {
        let table = Self::table_for(collection)?;
        self.check_writes(table)?;
        let key_field = remote_key_field(collection);

        let key = record
            .get(key_field)
            .or_else(|| record.get("id"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or(RemoteError::MissingKey {
                operation: "update",
                collection: collection.to_string(),
                field: "id",
            })?;

        let row = transform::outbound(collection, record);
        let mut inner = self.inner.lock();
        let rows = inner.tables.entry(Self::table_key(collection)).or_default();
        match rows
            .iter_mut()
            .find(|r| r.get(key_field).and_then(Value::as_str) == Some(key.as_str()))
        {
            Some(existing) => *existing = row,
            None => rows.push(row),
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        let table = Self::table_for(collection)?;
        self.check_writes(table)?;
        let key_field = remote_key_field(collection);

        let mut inner = self.inner.lock();
        if let Some(rows) = inner.tables.get_mut(&Self::table_key(collection)) {
            for row in rows.iter_mut() {
                if row.get(key_field).and_then(Value::as_str) == Some(key) {
                    if let Some(obj) = row.as_object_mut() {
                        obj.insert(
                            "deleted_at".to_string(),
                            Value::String("2026-01-01T00:00:00.000Z".to_string()),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        let table = Self::table_for(collection)?;
        self.check_writes(table)?;
        self.inner.lock().tables.remove(&Self::table_key(collection));
        Ok(())
    }
}

// ============================================================================
// Adapter construction helpers
// ============================================================================

pub struct Harness {
    pub adapter: StorageAdapter,
    pub settings: Arc<MemorySettings>,
    pub local: Arc<SqliteLocalStore>,
}

/// Build an adapter over an in-memory sqlite store and the given remote,
/// with the persisted mode preset. Does not initialize.
pub fn harness(mode: &str, remote: Option<Arc<MockRemote>>) -> Harness {
    let settings = Arc::new(MemorySettings::new());
    settings.set(MODE_KEY, mode).unwrap();

    let local = Arc::new(SqliteLocalStore::open_in_memory().unwrap());
    let adapter = StorageAdapter::new(
        AdapterConfig::new(settings.clone()),
        local.clone(),
        remote.map(|r| r as Arc<dyn RemoteStore>),
    );

    Harness {
        adapter,
        settings,
        local,
    }
}

/// `harness`, initialized.
pub async fn ready_harness(mode: &str, remote: Option<Arc<MockRemote>>) -> Harness {
    let h = harness(mode, remote);
    h.adapter.initialize().await.unwrap();
    h
}

/// Convenience: is this error's display text matching a fragment?
pub fn error_contains(err: &StoreError, fragment: &str) -> bool {
    err.to_string().contains(fragment)
}
