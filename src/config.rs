//! Adapter configuration: the key-value settings port, remote credentials,
//! and the options struct passed to `StorageAdapter::new`.
//!
//! Everything here is explicit constructor input. There is no ambient
//! preference store and no fallback credential pair — when the remote URL or
//! API key is unset the adapter fails closed and stays local-only.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::ConfigError;
use crate::types::AbandonedCallback;

/// Preference key holding the persisted storage mode.
pub const MODE_KEY: &str = "storage-mode";

/// Preference key holding the remote endpoint URL.
pub const REMOTE_URL_KEY: &str = "remote-url";

/// Preference key holding the remote API key.
pub const REMOTE_API_KEY_KEY: &str = "remote-api-key";

// ============================================================================
// SettingsPort
// ============================================================================

/// Minimal key-value preference store. Holds the storage mode and the remote
/// credentials; deliberately not the place for record data.
pub trait SettingsPort: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError>;
}

/// In-memory settings, for tests and embedders that manage persistence
/// themselves.
#[derive(Default)]
pub struct MemorySettings {
    values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsPort for MemorySettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Settings persisted as a flat JSON object in a single file.
pub struct JsonFileSettings {
    path: PathBuf,
    values: Mutex<HashMap<String, String>>,
}

impl JsonFileSettings {
    /// Open the settings file, creating state from an empty map when the
    /// file does not exist yet.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref().to_path_buf();
        let values = match std::fs::read_to_string(&path) {
            Ok(text) => {
                serde_json::from_str(&text).map_err(|e| ConfigError::Persist {
                    key: path.display().to_string(),
                    message: format!("settings file is not a JSON object: {e}"),
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(ConfigError::Persist {
                    key: path.display().to_string(),
                    message: e.to_string(),
                })
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn flush(&self, values: &HashMap<String, String>) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(values).map_err(|e| ConfigError::Persist {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(&self.path, text).map_err(|e| ConfigError::Persist {
            key: self.path.display().to_string(),
            message: e.to_string(),
        })
    }
}

impl SettingsPort for JsonFileSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }
}

// ============================================================================
// RemoteCredentials
// ============================================================================

/// Endpoint URL and API key for the remote store. Both are required; there
/// is no built-in default pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCredentials {
    pub url: String,
    pub api_key: String,
}

impl RemoteCredentials {
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    /// Read both credential keys from the settings port. `None` when either
    /// is unset or blank — callers are expected to stay local in that case.
    pub fn from_settings(settings: &dyn SettingsPort) -> Option<Self> {
        let url = settings.get(REMOTE_URL_KEY)?;
        let api_key = settings.get(REMOTE_API_KEY_KEY)?;
        if url.trim().is_empty() || api_key.trim().is_empty() {
            return None;
        }
        Some(Self { url, api_key })
    }
}

// ============================================================================
// AdapterConfig
// ============================================================================

/// What hybrid-mode reads do when the local store already has data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HybridReadPolicy {
    /// Serve local data whenever it is non-empty; consult remote only when
    /// the local result is absent/empty.
    #[default]
    LocalFirst,
    /// Always consult remote first, falling back to local on remote failure.
    RemoteFirst,
}

/// Configuration for `StorageAdapter`.
pub struct AdapterConfig {
    pub settings: Arc<dyn SettingsPort>,
    pub read_policy: HybridReadPolicy,
    /// Called with the full queued operation when it exhausts its retries
    /// and is dropped from the queue.
    pub on_abandoned: Option<Arc<AbandonedCallback>>,
}

impl AdapterConfig {
    pub fn new(settings: Arc<dyn SettingsPort>) -> Self {
        Self {
            settings,
            read_policy: HybridReadPolicy::default(),
            on_abandoned: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
