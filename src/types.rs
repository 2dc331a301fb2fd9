//! Shared types: storage modes, queued operations, status snapshots, and the
//! report/progress structures returned by the bulk transfer procedures.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;

// ============================================================================
// StorageMode
// ============================================================================

/// Which backend(s) every adapter operation touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageMode {
    /// Local store only — no cloud traffic at all.
    #[default]
    Local,
    /// Remote store only.
    Remote,
    /// Dual-write, read-local-first, with an offline queue for failed
    /// remote writes.
    Hybrid,
}

impl StorageMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageMode::Local => "local",
            StorageMode::Remote => "remote",
            StorageMode::Hybrid => "hybrid",
        }
    }

    /// Whether this mode needs a usable remote client.
    pub fn requires_remote(&self) -> bool {
        !matches!(self, StorageMode::Local)
    }
}

impl FromStr for StorageMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(StorageMode::Local),
            "remote" => Ok(StorageMode::Remote),
            "hybrid" => Ok(StorageMode::Hybrid),
            other => Err(ConfigError::InvalidMode(other.to_string())),
        }
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Queued operations
// ============================================================================

/// Write kind replayed against the remote store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuedOpKind {
    Add,
    Update,
    Delete,
}

impl fmt::Display for QueuedOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedOpKind::Add => f.write_str("add"),
            QueuedOpKind::Update => f.write_str("update"),
            QueuedOpKind::Delete => f.write_str("delete"),
        }
    }
}

/// A write that must eventually reach the remote store.
///
/// For `Add`/`Update` the payload is the record; for `Delete` it is the key
/// as a JSON string. The whole queue is persisted as one record in the local
/// `settings` collection so it survives restarts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    pub id: String,
    pub op: QueuedOpKind,
    pub collection: String,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub retries: u32,
}

// ============================================================================
// Status
// ============================================================================

/// Snapshot of adapter readiness, used by status surfaces instead of errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageStatus {
    pub mode: StorageMode,
    pub initialized: bool,
    pub online: bool,
    /// Whether the remote client exists and its last initialize succeeded.
    pub remote_ready: bool,
    pub queue_len: usize,
}

// ============================================================================
// Bulk transfer reports
// ============================================================================

/// Per-collection counters inside a transfer report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub total: usize,
    pub copied: usize,
    pub failed: usize,
}

/// One recorded failure during migration or sync. `batch` is set for batch
/// upload failures, `record_id` for per-record local insert failures.
#[derive(Debug, Clone)]
pub struct BatchError {
    pub collection: String,
    pub batch: Option<usize>,
    pub record_id: Option<String>,
    pub error: String,
}

/// Result of `migrate_to_remote`.
#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub total_records: usize,
    pub migrated_records: usize,
    pub failed_records: usize,
    pub errors: Vec<BatchError>,
    pub stores: HashMap<String, StoreCounts>,
}

/// Result of `sync_from_remote`.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    pub total_records: usize,
    pub synced_records: usize,
    pub failed_records: usize,
    pub errors: Vec<BatchError>,
    pub stores: HashMap<String, StoreCounts>,
}

/// Progress callback payload, fired after each batch.
#[derive(Debug, Clone)]
pub struct TransferProgress {
    pub collection: String,
    /// Records processed so far within this collection.
    pub processed: usize,
    /// Record count of this collection.
    pub total: usize,
    /// Cumulative copied count across all collections so far.
    pub overall_copied: usize,
    /// Cumulative record count across all collections seen so far.
    pub overall_total: usize,
}

// ============================================================================
// Change feed
// ============================================================================

/// A record-level change delivered by a remote subscription. Soft-deleted
/// rows never appear here.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub collection: String,
    /// The changed record, inbound-transformed.
    pub record: Value,
}

// ============================================================================
// Callbacks
// ============================================================================

/// Called after each migrated/synced batch.
pub type ProgressCallback = dyn Fn(&TransferProgress) + Send + Sync;

/// Called when a queued operation exhausts its retries and is dropped.
pub type AbandonedCallback = dyn Fn(&QueuedOperation) + Send + Sync;

/// Called for each event on a remote subscription.
pub type ChangeCallback = dyn Fn(&ChangeEvent) + Send + Sync;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
