use thiserror::Error;

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid storage mode \"{0}\". Must be: local, remote, or hybrid")]
    InvalidMode(String),

    #[error("Remote credentials missing. Configure remote-url and remote-api-key")]
    MissingCredentials,

    #[error("Failed to persist setting \"{key}\": {message}")]
    Persist { key: String, message: String },
}

// ---------------------------------------------------------------------------
// LocalError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum LocalError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("Storage corruption in {collection}/{id}: {message}")]
    Corruption {
        collection: String,
        id: String,
        message: String,
    },

    #[error("{operation} on {collection} requires an \"id\" field")]
    MissingId {
        operation: &'static str,
        collection: String,
    },
}

// ---------------------------------------------------------------------------
// RemoteError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Remote API error ({status}) on {table}: {message}")]
    Api {
        table: String,
        status: u16,
        message: String,
    },

    #[error("Remote authentication failed: {0}")]
    Auth(String),

    #[error("Unknown collection \"{0}\" — no remote table mapping")]
    UnknownCollection(String),

    #[error("{operation} on {collection} requires a \"{field}\" field")]
    MissingKey {
        operation: &'static str,
        collection: String,
        field: &'static str,
    },

    #[error("Remote client is not connected. Call initialize() first")]
    NotConnected,

    #[error("Malformed remote response for {table}: {message}")]
    Response { table: String, message: String },
}

impl RemoteError {
    /// Whether this error means the API key or session is bad, as opposed to
    /// a reachability or data problem. Used by the connectivity probe, which
    /// tolerates everything except a credential failure.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RemoteError::Auth(_) | RemoteError::Api { status: 401 | 403, .. }
        )
    }
}

// ---------------------------------------------------------------------------
// StoreError — top-level rollup
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Local(#[from] LocalError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("StorageAdapter is not initialized. Call initialize() first")]
    NotInitialized,

    #[error("No backend available for {0}")]
    NoBackend(&'static str),

    #[error("Cannot {0} while in local-only mode")]
    LocalOnly(&'static str),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias — the default error type is `StoreError`.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
