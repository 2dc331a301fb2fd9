//! StorageAdapter — single entry point for all persistence operations.
//!
//! Hides backend selection behind the configured mode and keeps hybrid mode
//! resilient: the local write is authoritative, the paired remote write is
//! best-effort, and a failed remote write lands in a durable offline queue
//! that drains when connectivity returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use uuid::Uuid;

use crate::collections::{self, COLLECTION_TABLES};
use crate::config::{AdapterConfig, HybridReadPolicy, MODE_KEY};
use crate::error::{Result, StoreError};
use crate::transform;
use crate::types::{
    BatchError, MigrationReport, ProgressCallback, QueuedOpKind, QueuedOperation, StorageMode,
    StorageStatus, StoreCounts, SyncReport, TransferProgress,
};

use super::traits::{LocalStore, RemoteStore};

/// Id of the settings record holding the persisted offline queue.
const QUEUE_RECORD_ID: &str = "sync-queue";

/// Failed replay attempts before a queued operation is abandoned.
const MAX_RETRIES: u32 = 3;

/// Records per batch during bulk migration/sync.
const TRANSFER_BATCH: usize = 50;

// ============================================================================
// StorageAdapter
// ============================================================================

pub struct StorageAdapter {
    config: AdapterConfig,
    local: Arc<dyn LocalStore>,
    remote: Option<Arc<dyn RemoteStore>>,
    mode: RwLock<StorageMode>,
    initialized: AtomicBool,
    online: AtomicBool,
    remote_ready: AtomicBool,
    queue: Mutex<Vec<QueuedOperation>>,
    /// Serializes queue drains; enqueues stay lock-free with respect to this.
    drain_lock: tokio::sync::Mutex<()>,
}

impl StorageAdapter {
    /// Create an adapter over an on-device store and an optional remote
    /// client. The active mode is read from the settings port; absent or
    /// unrecognized values fall back to local-only.
    pub fn new(
        config: AdapterConfig,
        local: Arc<dyn LocalStore>,
        remote: Option<Arc<dyn RemoteStore>>,
    ) -> Self {
        let mode = match config.settings.get(MODE_KEY) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %raw, "unrecognized persisted storage mode, using local");
                StorageMode::Local
            }),
            None => StorageMode::Local,
        };

        Self {
            config,
            local,
            remote,
            mode: RwLock::new(mode),
            initialized: AtomicBool::new(false),
            online: AtomicBool::new(true),
            remote_ready: AtomicBool::new(false),
            queue: Mutex::new(Vec::new()),
            drain_lock: tokio::sync::Mutex::new(()),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Initialize the backend(s) for the current mode. Idempotent.
    ///
    /// Errors only when the local store itself is unusable. A mode that
    /// needs the remote backend silently downgrades to local-only when the
    /// remote client is absent or its initialization fails; the downgrade
    /// is persisted.
    pub async fn initialize(&self) -> Result<()> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }

        // Local store probe — the one fatal path.
        self.local.get(collections::SETTINGS, QUEUE_RECORD_ID)?;

        self.load_offline_queue();
        self.remote_ready.store(false, Ordering::SeqCst);

        let mode = *self.mode.read();
        if mode.requires_remote() {
            match &self.remote {
                None => self.downgrade_to_local(mode, "remote client not configured"),
                Some(remote) => match remote.initialize().await {
                    Ok(()) => self.remote_ready.store(true, Ordering::SeqCst),
                    Err(e) => self.downgrade_to_local(mode, &e.to_string()),
                },
            }
        }

        self.initialized.store(true, Ordering::SeqCst);
        tracing::info!(mode = %self.mode.read(), "storage adapter initialized");
        Ok(())
    }

    fn downgrade_to_local(&self, from: StorageMode, reason: &str) {
        tracing::warn!(
            from = %from,
            reason = %reason,
            "remote backend unavailable, downgrading to local-only"
        );
        *self.mode.write() = StorageMode::Local;
        if let Err(e) = self
            .config
            .settings
            .set(MODE_KEY, StorageMode::Local.as_str())
        {
            tracing::warn!(error = %e, "failed to persist downgraded storage mode");
        }
    }

    /// Switch the storage mode and re-initialize. No-op when unchanged.
    /// Re-initialization may itself downgrade; a hard failure reverts the
    /// persisted mode to the previous value and propagates.
    pub async fn set_storage_mode(&self, mode: StorageMode) -> Result<()> {
        let old = *self.mode.read();
        if mode == old {
            return Ok(());
        }

        *self.mode.write() = mode;
        self.config.settings.set(MODE_KEY, mode.as_str())?;
        self.initialized.store(false, Ordering::SeqCst);

        match self.initialize().await {
            Ok(()) => {
                tracing::info!(from = %old, to = %self.mode.read(), "storage mode changed");
                Ok(())
            }
            Err(e) => {
                *self.mode.write() = old;
                if let Err(revert) = self.config.settings.set(MODE_KEY, old.as_str()) {
                    tracing::warn!(error = %revert, "failed to revert persisted storage mode");
                }
                tracing::error!(error = %e, "failed to change storage mode");
                Err(e)
            }
        }
    }

    pub fn get_storage_mode(&self) -> StorageMode {
        *self.mode.read()
    }

    /// Readiness snapshot for status surfaces.
    pub fn status(&self) -> StorageStatus {
        StorageStatus {
            mode: *self.mode.read(),
            initialized: self.initialized.load(Ordering::SeqCst),
            online: self.online.load(Ordering::SeqCst),
            remote_ready: self.remote_ready.load(Ordering::SeqCst),
            queue_len: self.queue.lock().len(),
        }
    }

    /// Connectivity notification entry point. Going online drains the
    /// offline queue.
    pub async fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        if online {
            tracing::info!("connection restored, processing offline queue");
            self.process_offline_queue().await;
        } else {
            tracing::info!("connection lost, remote writes will be queued");
        }
    }

    // -----------------------------------------------------------------------
    // Guards
    // -----------------------------------------------------------------------

    fn ensure_initialized(&self) -> Result<()> {
        if !self.initialized.load(Ordering::SeqCst) {
            return Err(StoreError::NotInitialized);
        }
        Ok(())
    }

    fn remote_or_err(&self, operation: &'static str) -> Result<&Arc<dyn RemoteStore>> {
        self.remote
            .as_ref()
            .ok_or(StoreError::NoBackend(operation))
    }

    // -----------------------------------------------------------------------
    // CRUD
    // -----------------------------------------------------------------------

    /// Add a record, returning the id assigned by the authoritative backend
    /// for the current mode.
    pub async fn add(&self, collection: &str, record: &Value) -> Result<String> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.add(collection, record),
            StorageMode::Remote => self.remote_or_err("add")?.add(collection, record).await,
            StorageMode::Hybrid => {
                // Local write first for an immediate, authoritative response.
                let id = self.local.add(collection, record)?;
                self.forward_to_remote(QueuedOpKind::Add, collection, record.clone())
                    .await;
                Ok(id)
            }
        }
    }

    /// Fetch a record by key.
    pub async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.get(collection, key),
            StorageMode::Remote => self.remote_or_err("get")?.get(collection, key).await,
            StorageMode::Hybrid => match self.config.read_policy {
                HybridReadPolicy::LocalFirst => {
                    match self.local.get(collection, key) {
                        Ok(Some(record)) => return Ok(Some(record)),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(collection, key, error = %e, "local get failed in hybrid mode");
                        }
                    }
                    self.remote_or_err("get")?.get(collection, key).await
                }
                HybridReadPolicy::RemoteFirst => {
                    match self.remote_or_err("get")?.get(collection, key).await {
                        Ok(record) => Ok(record),
                        Err(e) => {
                            tracing::warn!(collection, key, error = %e, "remote get failed, falling back to local");
                            self.local.get(collection, key)
                        }
                    }
                }
            },
        }
    }

    /// Fetch all records in a collection.
    pub async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.get_all(collection),
            StorageMode::Remote => self.remote_or_err("get_all")?.get_all(collection).await,
            StorageMode::Hybrid => match self.config.read_policy {
                HybridReadPolicy::LocalFirst => {
                    match self.local.get_all(collection) {
                        Ok(records) if !records.is_empty() => return Ok(records),
                        Ok(_) => {}
                        Err(e) => {
                            tracing::warn!(collection, error = %e, "local get_all failed in hybrid mode");
                        }
                    }
                    self.remote_or_err("get_all")?.get_all(collection).await
                }
                HybridReadPolicy::RemoteFirst => {
                    match self.remote_or_err("get_all")?.get_all(collection).await {
                        Ok(records) => Ok(records),
                        Err(e) => {
                            tracing::warn!(collection, error = %e, "remote get_all failed, falling back to local");
                            self.local.get_all(collection)
                        }
                    }
                }
            },
        }
    }

    /// Update a record in place. The record must carry its key field.
    pub async fn update(&self, collection: &str, record: &Value) -> Result<()> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.update(collection, record),
            StorageMode::Remote => self.remote_or_err("update")?.update(collection, record).await,
            StorageMode::Hybrid => {
                self.local.update(collection, record)?;
                self.forward_to_remote(QueuedOpKind::Update, collection, record.clone())
                    .await;
                Ok(())
            }
        }
    }

    /// Delete a record by key. Local deletes are hard; the remote side soft
    /// deletes.
    pub async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.delete(collection, key),
            StorageMode::Remote => self.remote_or_err("delete")?.delete(collection, key).await,
            StorageMode::Hybrid => {
                self.local.delete(collection, key)?;
                self.forward_to_remote(
                    QueuedOpKind::Delete,
                    collection,
                    Value::String(key.to_string()),
                )
                .await;
                Ok(())
            }
        }
    }

    /// Clear a collection. In hybrid mode both backends are cleared; a
    /// remote failure is logged and swallowed — clears are not replayable
    /// through the queue.
    pub async fn clear(&self, collection: &str) -> Result<()> {
        self.ensure_initialized()?;

        match *self.mode.read() {
            StorageMode::Local => self.local.clear(collection),
            StorageMode::Remote => self.remote_or_err("clear")?.clear(collection).await,
            StorageMode::Hybrid => {
                let local_result = self.local.clear(collection);
                if let Some(remote) = &self.remote {
                    if let Err(e) = remote.clear(collection).await {
                        tracing::warn!(collection, error = %e, "remote clear failed in hybrid mode");
                    }
                }
                local_result
            }
        }
    }

    // -----------------------------------------------------------------------
    // Offline queue
    // -----------------------------------------------------------------------

    /// Best-effort remote leg of a hybrid write. Failure queues the
    /// operation instead of propagating; this is the only inline path to
    /// the remote store for hybrid writes.
    async fn forward_to_remote(&self, op: QueuedOpKind, collection: &str, payload: Value) {
        let result = match &self.remote {
            None => Err(StoreError::NoBackend("hybrid write")),
            Some(remote) => self.apply_remote(remote, op, collection, &payload).await,
        };

        if let Err(e) = result {
            tracing::warn!(
                collection,
                op = %op,
                error = %e,
                "remote write failed in hybrid mode, queuing"
            );
            self.queue_offline_operation(op, collection, payload);
        }
    }

    async fn apply_remote(
        &self,
        remote: &Arc<dyn RemoteStore>,
        op: QueuedOpKind,
        collection: &str,
        payload: &Value,
    ) -> Result<()> {
        match op {
            QueuedOpKind::Add => remote.add(collection, payload).await.map(|_| ()),
            QueuedOpKind::Update => remote.update(collection, payload).await,
            QueuedOpKind::Delete => {
                let key = payload.as_str().ok_or_else(|| {
                    StoreError::Internal("queued delete payload is not a key string".to_string())
                })?;
                remote.delete(collection, key).await
            }
        }
    }

    /// Append an operation to the offline queue and persist the queue.
    pub fn queue_offline_operation(&self, op: QueuedOpKind, collection: &str, payload: Value) {
        let item = QueuedOperation {
            id: Uuid::new_v4().to_string(),
            op,
            collection: collection.to_string(),
            payload,
            timestamp: Utc::now(),
            retries: 0,
        };

        self.queue.lock().push(item);
        self.persist_queue();
    }

    /// A copy of the pending queue, oldest first.
    pub fn queued_operations(&self) -> Vec<QueuedOperation> {
        self.queue.lock().clone()
    }

    /// Replay the offline queue against the remote store in FIFO order.
    ///
    /// Each item is retried on later drains until it succeeds or reaches
    /// the retry ceiling, at which point it is dropped and reported through
    /// the `on_abandoned` callback. Never errors — failures stay queued or
    /// are logged.
    pub async fn process_offline_queue(&self) {
        let _guard = self.drain_lock.lock().await;

        let Some(remote) = self.remote.clone() else {
            return;
        };
        if !self.online.load(Ordering::SeqCst) {
            return;
        }

        let snapshot = self.queue.lock().clone();
        if snapshot.is_empty() {
            return;
        }

        tracing::info!(len = snapshot.len(), "processing offline queue");

        let mut succeeded: Vec<String> = Vec::new();
        let mut failed: Vec<String> = Vec::new();

        for item in &snapshot {
            match self
                .apply_remote(&remote, item.op, &item.collection, &item.payload)
                .await
            {
                Ok(()) => {
                    tracing::debug!(op = %item.op, collection = %item.collection, "queued operation replayed");
                    succeeded.push(item.id.clone());
                }
                Err(e) => {
                    tracing::warn!(
                        op = %item.op,
                        collection = %item.collection,
                        attempt = item.retries + 1,
                        error = %e,
                        "queued operation failed"
                    );
                    failed.push(item.id.clone());
                }
            }
        }

        let mut abandoned: Vec<QueuedOperation> = Vec::new();
        {
            let mut queue = self.queue.lock();
            queue.retain_mut(|item| {
                if succeeded.contains(&item.id) {
                    return false;
                }
                if failed.contains(&item.id) {
                    item.retries += 1;
                    if item.retries >= MAX_RETRIES {
                        abandoned.push(item.clone());
                        return false;
                    }
                }
                true
            });
        }

        for item in &abandoned {
            tracing::warn!(
                op = %item.op,
                collection = %item.collection,
                retries = item.retries,
                "queued operation abandoned after retry ceiling"
            );
            if let Some(ref on_abandoned) = self.config.on_abandoned {
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    on_abandoned(item);
                }));
            }
        }

        self.persist_queue();

        if !succeeded.is_empty() || !abandoned.is_empty() {
            tracing::info!(
                replayed = succeeded.len(),
                abandoned = abandoned.len(),
                "offline queue drain complete"
            );
        }
    }

    fn persist_queue(&self) {
        let queue = self.queue.lock().clone();
        let record = match serde_json::to_value(&queue) {
            Ok(items) => serde_json::json!({
                "id": QUEUE_RECORD_ID,
                "queue": items,
                "lastUpdated": Utc::now().to_rfc3339(),
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize offline queue");
                return;
            }
        };

        if let Err(e) = self.local.update(collections::SETTINGS, &record) {
            tracing::warn!(error = %e, "failed to persist offline queue");
        }
    }

    fn load_offline_queue(&self) {
        let loaded = match self.local.get(collections::SETTINGS, QUEUE_RECORD_ID) {
            Ok(Some(record)) => {
                match serde_json::from_value::<Vec<QueuedOperation>>(
                    record.get("queue").cloned().unwrap_or(Value::Null),
                ) {
                    Ok(items) => items,
                    Err(e) => {
                        tracing::warn!(error = %e, "persisted offline queue is malformed, starting empty");
                        Vec::new()
                    }
                }
            }
            Ok(None) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "failed to load offline queue, starting empty");
                Vec::new()
            }
        };

        if !loaded.is_empty() {
            tracing::info!(len = loaded.len(), "loaded queued operations");
        }
        *self.queue.lock() = loaded;
    }

    // -----------------------------------------------------------------------
    // Bulk transfer
    // -----------------------------------------------------------------------

    fn fire_progress(progress: Option<&ProgressCallback>, payload: &TransferProgress) {
        if let Some(cb) = progress {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cb(payload)));
        }
    }

    /// Bulk-copy every known collection from the local store to the remote
    /// store, in batches of 50. A batch failure is recorded and the
    /// procedure continues; nothing is rolled back.
    pub async fn migrate_to_remote(
        &self,
        progress: Option<&ProgressCallback>,
    ) -> Result<MigrationReport> {
        self.ensure_initialized()?;

        if *self.mode.read() == StorageMode::Local {
            return Err(StoreError::LocalOnly("migrate"));
        }
        let remote = self.remote_or_err("migration")?.clone();

        let mut report = MigrationReport::default();
        tracing::info!("starting migration to remote store");

        for (store, table) in COLLECTION_TABLES {
            let records = match self.local.get_all(store) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(collection = store, error = %e, "failed to read collection for migration");
                    report.errors.push(BatchError {
                        collection: store.to_string(),
                        batch: None,
                        record_id: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if records.is_empty() {
                tracing::debug!(collection = store, "no records to migrate");
                continue;
            }

            let total = records.len();
            let mut counts = StoreCounts {
                total,
                ..StoreCounts::default()
            };
            report.total_records += total;

            for (batch_idx, chunk) in records.chunks(TRANSFER_BATCH).enumerate() {
                let rows: Vec<Value> = chunk
                    .iter()
                    .map(|record| transform::outbound(store, record))
                    .collect();

                match remote.add_batch(store, &rows).await {
                    Ok(inserted) => {
                        report.migrated_records += inserted;
                        counts.copied += inserted;
                    }
                    Err(e) => {
                        tracing::warn!(
                            collection = store,
                            table,
                            batch = batch_idx,
                            error = %e,
                            "migration batch failed"
                        );
                        report.errors.push(BatchError {
                            collection: store.to_string(),
                            batch: Some(batch_idx),
                            record_id: None,
                            error: e.to_string(),
                        });
                        report.failed_records += chunk.len();
                        counts.failed += chunk.len();
                    }
                }

                Self::fire_progress(
                    progress,
                    &TransferProgress {
                        collection: store.to_string(),
                        processed: (batch_idx * TRANSFER_BATCH + chunk.len()).min(total),
                        total,
                        overall_copied: report.migrated_records,
                        overall_total: report.total_records,
                    },
                );
            }

            report.stores.insert(store.to_string(), counts);
        }

        tracing::info!(
            total = report.total_records,
            migrated = report.migrated_records,
            failed = report.failed_records,
            "migration complete"
        );
        Ok(report)
    }

    /// Bulk-copy every known collection from the remote store into the
    /// local store. Destructive: each local collection is cleared before
    /// the fetched records are inserted one at a time.
    pub async fn sync_from_remote(&self, progress: Option<&ProgressCallback>) -> Result<SyncReport> {
        self.ensure_initialized()?;

        if *self.mode.read() == StorageMode::Local {
            return Err(StoreError::LocalOnly("sync"));
        }
        let remote = self.remote_or_err("sync")?.clone();

        let mut report = SyncReport::default();
        tracing::info!("starting sync from remote store");

        for (store, table) in COLLECTION_TABLES {
            let records = match remote.get_all(store).await {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(collection = store, table, error = %e, "failed to fetch collection for sync");
                    report.errors.push(BatchError {
                        collection: store.to_string(),
                        batch: None,
                        record_id: None,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            if records.is_empty() {
                tracing::debug!(collection = store, "no remote records to sync");
                continue;
            }

            let total = records.len();
            let mut counts = StoreCounts {
                total,
                ..StoreCounts::default()
            };
            report.total_records += total;

            // Destructive replace: drop local data before re-inserting.
            if let Err(e) = self.local.clear(store) {
                tracing::warn!(collection = store, error = %e, "failed to clear collection before sync");
                report.errors.push(BatchError {
                    collection: store.to_string(),
                    batch: None,
                    record_id: None,
                    error: e.to_string(),
                });
                report.stores.insert(store.to_string(), counts);
                continue;
            }

            for chunk in records.chunks(TRANSFER_BATCH) {
                for record in chunk {
                    match self.local.add(store, record) {
                        Ok(_) => {
                            report.synced_records += 1;
                            counts.copied += 1;
                        }
                        Err(e) => {
                            let record_id = record
                                .get("id")
                                .or_else(|| record.get("name"))
                                .and_then(Value::as_str)
                                .map(|s| s.to_string());
                            tracing::warn!(
                                collection = store,
                                record_id = record_id.as_deref().unwrap_or("?"),
                                error = %e,
                                "failed to sync record into local store"
                            );
                            report.errors.push(BatchError {
                                collection: store.to_string(),
                                batch: None,
                                record_id,
                                error: e.to_string(),
                            });
                            report.failed_records += 1;
                            counts.failed += 1;
                        }
                    }
                }

                Self::fire_progress(
                    progress,
                    &TransferProgress {
                        collection: store.to_string(),
                        processed: (counts.copied + counts.failed).min(total),
                        total,
                        overall_copied: report.synced_records,
                        overall_total: report.total_records,
                    },
                );
            }

            report.stores.insert(store.to_string(), counts);
        }

        tracing::info!(
            total = report.total_records,
            synced = report.synced_records,
            failed = report.failed_records,
            "sync complete"
        );
        Ok(report)
    }
}
