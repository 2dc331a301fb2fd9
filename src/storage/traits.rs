//! Backend traits for the storage adapter.
//!
//! `LocalStore` is the synchronous on-device backend; every call is an
//! independent transaction. `RemoteStore` is the async cloud backend. Both
//! are constructor inputs to `StorageAdapter` — absence of a remote backend
//! is modeled as `None`, never probed at runtime.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// On-device key-value store partitioned into named collections. Records
/// are JSON objects keyed by their `id` field; deletes are hard deletes.
///
/// Implementors must be `Send + Sync` so they can be shared across tasks.
pub trait LocalStore: Send + Sync {
    /// Insert a record, assigning a locally-unique string id when the
    /// record does not carry one. Returns the record's id.
    fn add(&self, collection: &str, record: &Value) -> Result<String>;

    /// Fetch a record by id. `None` when absent.
    fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// All records in a collection.
    fn get_all(&self, collection: &str) -> Result<Vec<Value>>;

    /// Insert or replace by the record's `id` field.
    fn update(&self, collection: &str, record: &Value) -> Result<()>;

    /// Remove a record. Removing an absent record is not an error.
    fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Remove every record in a collection.
    fn clear(&self, collection: &str) -> Result<()>;
}

/// Cloud store exposing the same collection-oriented contract, with
/// soft-delete semantics: `delete` marks rows, and marked rows are excluded
/// from `get`/`get_all`.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Establish the connection: probe reachability and verify credentials.
    /// An error here means "remote unavailable" — the adapter downgrades
    /// rather than propagating.
    async fn initialize(&self) -> Result<()>;

    /// Insert a record and return the backend-assigned key. The settings
    /// collection requires a caller-supplied `name`; for every other
    /// collection a caller `id` is discarded in favor of a fresh UUID.
    async fn add(&self, collection: &str, record: &Value) -> Result<String>;

    /// Fetch by primary key, excluding soft-deleted rows.
    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>>;

    /// All non-soft-deleted records, newest first.
    async fn get_all(&self, collection: &str) -> Result<Vec<Value>>;

    /// Bulk-insert rows that are already in the remote column shape
    /// (outbound-transformed). Used by migration; no per-row transform is
    /// applied. Returns the number of rows inserted.
    async fn add_batch(&self, collection: &str, rows: &[Value]) -> Result<usize>;

    /// Update by the record's primary-key field; errors when the key field
    /// is missing.
    async fn update(&self, collection: &str, record: &Value) -> Result<()>;

    /// Soft delete: stamp the deletion timestamp, keep the row.
    async fn delete(&self, collection: &str, key: &str) -> Result<()>;

    /// Hard-delete every row in the collection. Administrative resets only.
    async fn clear(&self, collection: &str) -> Result<()>;
}
