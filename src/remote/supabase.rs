//! SupabaseRemote — PostgREST implementation of `RemoteStore`.
//!
//! Speaks to `{url}/rest/v1/{table}` with API-key headers. Rows live in
//! snake_case with `created_at`/`updated_at`/`deleted_at` columns; `delete`
//! stamps `deleted_at` instead of removing the row, and reads always filter
//! soft-deleted rows out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;

use crate::collections::{self, remote_key_field, remote_table};
use crate::config::{RemoteCredentials, SettingsPort};
use crate::error::{ConfigError, RemoteError, Result, StoreError};
use crate::storage::traits::RemoteStore;
use crate::transform;
use crate::types::ChangeCallback;

use super::subscribe::{
    spawn_subscription, stop_subscription, SubscriptionHandle, SubscriptionRegistry,
};

/// Table probed during initialize to verify reachability.
const PROBE_TABLE: &str = "cutting_records";

#[derive(Debug)]
pub struct SupabaseRemote {
    base_url: String,
    client: reqwest::Client,
    connected: AtomicBool,
    subscriptions: SubscriptionRegistry,
}

impl SupabaseRemote {
    /// Build a client from explicit credentials. There is no fallback pair:
    /// callers without configured credentials should not construct a remote
    /// client at all.
    pub fn new(credentials: RemoteCredentials) -> Result<Self> {
        let api_key = HeaderValue::from_str(&credentials.api_key)
            .map_err(|_| RemoteError::Auth("API key contains invalid header characters".into()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", credentials.api_key))
            .map_err(|_| RemoteError::Auth("API key contains invalid header characters".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert("apikey", api_key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .default_headers(headers)
            .build()
            .map_err(RemoteError::Http)?;

        Ok(Self {
            base_url: credentials.url.trim_end_matches('/').to_string(),
            client,
            connected: AtomicBool::new(false),
            subscriptions: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Build a client from the credential keys in a settings port. Errors
    /// when either key is unset — failing closed is deliberate; there is no
    /// default endpoint/key pair.
    pub fn from_settings(settings: &dyn SettingsPort) -> Result<Self> {
        let credentials =
            RemoteCredentials::from_settings(settings).ok_or(ConfigError::MissingCredentials)?;
        Self::new(credentials)
    }

    fn endpoint(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn table_for(collection: &str) -> Result<&'static str> {
        remote_table(collection)
            .ok_or_else(|| RemoteError::UnknownCollection(collection.to_string()).into())
    }

    fn ensure_connected(&self) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(RemoteError::NotConnected.into());
        }
        Ok(())
    }

    /// Map a non-success response to the error taxonomy, reading the body
    /// for the message.
    async fn api_error(table: &str, response: reqwest::Response) -> StoreError {
        let status = response.status().as_u16();
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "unreadable error body".to_string());
        if status == 401 || status == 403 {
            RemoteError::Auth(format!("HTTP {status}: {message}")).into()
        } else {
            RemoteError::Api {
                table: table.to_string(),
                status,
                message,
            }
            .into()
        }
    }

    async fn read_rows(table: &str, response: reqwest::Response) -> Result<Vec<Value>> {
        response.json().await.map_err(|e| {
            RemoteError::Response {
                table: table.to_string(),
                message: e.to_string(),
            }
            .into()
        })
    }

    fn now_iso() -> String {
        Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    // -----------------------------------------------------------------------
    // Change feed
    // -----------------------------------------------------------------------

    /// Register a live change feed for a collection. At most one
    /// subscription per collection is tracked; subscribing again replaces
    /// the tracked entry, and the untracked task keeps running until its
    /// own handle is dropped.
    pub fn subscribe(
        &self,
        collection: &str,
        callback: Arc<ChangeCallback>,
    ) -> Result<SubscriptionHandle> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;

        Ok(spawn_subscription(
            Arc::clone(&self.subscriptions),
            self.client.clone(),
            self.endpoint(table),
            collection.to_string(),
            callback,
        ))
    }

    /// Stop and untrack the feed for a collection.
    pub fn unsubscribe(&self, collection: &str) {
        stop_subscription(&self.subscriptions, collection);
    }
}

// ============================================================================
// RemoteStore
// ============================================================================

#[async_trait]
impl RemoteStore for SupabaseRemote {
    /// Bounded connectivity probe. A missing table or empty result still
    /// counts as connected; an authentication rejection does not.
    async fn initialize(&self) -> Result<()> {
        let response = self
            .client
            .get(self.endpoint(PROBE_TABLE))
            .query(&[("select", "id"), ("limit", "1")])
            .send()
            .await
            .map_err(RemoteError::Http)?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(table = PROBE_TABLE, "remote connectivity probe succeeded");
        } else {
            let err = Self::api_error(PROBE_TABLE, response).await;
            if matches!(&err, StoreError::Remote(e) if e.is_auth()) {
                return Err(err);
            }
            // Probe table may not exist yet; the connection itself works.
            tracing::debug!(
                table = PROBE_TABLE,
                status = status.as_u16(),
                error = %err,
                "remote probe rejected, tolerating as connected"
            );
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(url = %self.base_url, "remote store client connected");
        Ok(())
    }

    async fn add(&self, collection: &str, record: &Value) -> Result<String> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;
        let key_field = remote_key_field(collection);

        let mut row = transform::outbound(collection, record)
            .as_object()
            .cloned()
            .unwrap_or_default();

        if collection == collections::SETTINGS {
            // app_settings is keyed by a caller-supplied name.
            match row.get("name").and_then(Value::as_str) {
                Some(name) if !name.is_empty() => {}
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
            // Let the backend assign a fresh UUID.
            row.remove("id");
        }

        let response = self
            .client
            .post(self.endpoint(table))
            .query(&[("select", key_field)])
            .header("Prefer", "return=representation")
            .json(&Value::Object(row))
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        let rows = Self::read_rows(table, response).await?;
        let assigned = rows
            .first()
            .and_then(|row| row.get(key_field))
            .and_then(Value::as_str)
            .ok_or_else(|| RemoteError::Response {
                table: table.to_string(),
                message: format!("insert did not return a {key_field}"),
            })?;

        tracing::debug!(table, key = assigned, "added remote record");
        Ok(assigned.to_string())
    }

    async fn get(&self, collection: &str, key: &str) -> Result<Option<Value>> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;
        let key_field = remote_key_field(collection);

        let key_filter = format!("eq.{key}");
        let response = self
            .client
            .get(self.endpoint(table))
            .query(&[
                ("select", "*"),
                (key_field, key_filter.as_str()),
                ("deleted_at", "is.null"),
            ])
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        let rows = Self::read_rows(table, response).await?;
        Ok(rows.first().map(|row| transform::inbound(collection, row)))
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<Value>> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;

        let response = self
            .client
            .get(self.endpoint(table))
            .query(&[
                ("select", "*"),
                ("deleted_at", "is.null"),
                ("order", "created_at.desc"),
            ])
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        let rows = Self::read_rows(table, response).await?;
        Ok(rows
            .iter()
            .map(|row| transform::inbound(collection, row))
            .collect())
    }

    async fn add_batch(&self, collection: &str, rows: &[Value]) -> Result<usize> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;

        let response = self
            .client
            .post(self.endpoint(table))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        let inserted = Self::read_rows(table, response).await?;
        Ok(inserted.len())
    }

    async fn update(&self, collection: &str, record: &Value) -> Result<()> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;
        let key_field = remote_key_field(collection);

        let key = record
            .get(key_field)
            .or_else(|| record.get("id"))
            .and_then(Value::as_str)
            .map(|s| s.to_string())
            .ok_or(RemoteError::MissingKey {
                operation: "update",
                collection: collection.to_string(),
                field: if collection == collections::SETTINGS {
                    "name"
                } else {
                    "id"
                },
            })?;

        let row = transform::outbound(collection, record);

        let key_filter = format!("eq.{key}");
        let response = self
            .client
            .patch(self.endpoint(table))
            .query(&[(key_field, key_filter.as_str())])
            .json(&row)
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        tracing::debug!(table, key = %key, "updated remote record");
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<()> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;
        let key_field = remote_key_field(collection);

        let key_filter = format!("eq.{key}");
        let response = self
            .client
            .patch(self.endpoint(table))
            .query(&[(key_field, key_filter.as_str())])
            .json(&serde_json::json!({ "deleted_at": Self::now_iso() }))
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        tracing::debug!(table, key, "soft deleted remote record");
        Ok(())
    }

    async fn clear(&self, collection: &str) -> Result<()> {
        self.ensure_connected()?;
        let table = Self::table_for(collection)?;
        let key_field = remote_key_field(collection);

        // PostgREST refuses an unfiltered DELETE; a non-null primary key
        // matches every row for both key shapes.
        let response = self
            .client
            .delete(self.endpoint(table))
            .query(&[(key_field, "not.is.null")])
            .send()
            .await
            .map_err(RemoteError::Http)?;

        if !response.status().is_success() {
            return Err(Self::api_error(table, response).await);
        }

        tracing::info!(table, "cleared remote table");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
