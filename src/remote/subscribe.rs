//! Change-feed plumbing for the remote store.
//!
//! Each subscription is a polling task that watches a table for rows whose
//! `updated_at` moved past the last seen cursor, excluding soft-deleted
//! rows, and delivers them inbound-transformed to the callback. One
//! subscription per collection is tracked; registering a second one
//! replaces the tracked entry without stopping the first task.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::transform;
use crate::types::{ChangeCallback, ChangeEvent};

/// How often a subscription polls its table.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Tracked stop flags, one per subscribed collection.
pub(crate) type SubscriptionRegistry = Arc<Mutex<HashMap<String, Arc<AtomicBool>>>>;

/// Live subscription to a collection's change feed. Dropping the handle
/// unsubscribes.
pub struct SubscriptionHandle {
    collection: String,
    stop: Arc<AtomicBool>,
    registry: SubscriptionRegistry,
}

impl SubscriptionHandle {
    /// Stop the feed and drop the tracked registration.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl Drop for SubscriptionHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        let mut registry = self.registry.lock();
        // Only remove the tracked entry when it is still ours — a later
        // subscribe() may have replaced it.
        if let Some(current) = registry.get(&self.collection) {
            if Arc::ptr_eq(current, &self.stop) {
                registry.remove(&self.collection);
            }
        }
    }
}

/// Stop and untrack the feed for a collection, if one is tracked.
pub(crate) fn stop_subscription(registry: &SubscriptionRegistry, collection: &str) {
    if let Some(stop) = registry.lock().remove(collection) {
        stop.store(true, Ordering::SeqCst);
        tracing::debug!(collection, "unsubscribed from change feed");
    }
}

/// Spawn the polling task and track its stop flag, returning the caller's
/// handle.
pub(crate) fn spawn_subscription(
    registry: SubscriptionRegistry,
    client: reqwest::Client,
    endpoint: String,
    collection: String,
    callback: Arc<ChangeCallback>,
) -> SubscriptionHandle {
    let stop = Arc::new(AtomicBool::new(false));

    registry
        .lock()
        .insert(collection.clone(), Arc::clone(&stop));

    let task_stop = Arc::clone(&stop);
    let task_collection = collection.clone();
    tokio::spawn(async move {
        let mut cursor = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;
            if task_stop.load(Ordering::SeqCst) {
                break;
            }

            let cursor_filter = format!("gt.{cursor}");
            let response = client
                .get(&endpoint)
                .query(&[
                    ("select", "*"),
                    ("deleted_at", "is.null"),
                    ("updated_at", cursor_filter.as_str()),
                    ("order", "updated_at.asc"),
                ])
                .send()
                .await;

            let rows: Vec<Value> = match response {
                Ok(resp) if resp.status().is_success() => match resp.json().await {
                    Ok(rows) => rows,
                    Err(e) => {
                        tracing::warn!(collection = %task_collection, error = %e, "change feed poll returned malformed rows");
                        continue;
                    }
                },
                Ok(resp) => {
                    tracing::warn!(
                        collection = %task_collection,
                        status = resp.status().as_u16(),
                        "change feed poll rejected"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::debug!(collection = %task_collection, error = %e, "change feed poll failed");
                    continue;
                }
            };

            for row in rows {
                if let Some(updated) = row.get("updated_at").and_then(Value::as_str) {
                    if updated > cursor.as_str() {
                        cursor = updated.to_string();
                    }
                }
                let event = ChangeEvent {
                    collection: task_collection.clone(),
                    record: transform::inbound(&task_collection, &row),
                };
                let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                    callback(&event);
                }));
            }
        }
    });

    tracing::debug!(collection = %collection, "subscribed to change feed");
    SubscriptionHandle {
        collection,
        stop,
        registry,
    }
}
