//! Last-write-wins storage for keyed push notifications

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

/// The most recent payload received for one `(method, key)` pair.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredNotification {
    pub params: Value,
    pub received_at: DateTime<Utc>,
}

/// Keyed notification payloads such as diagnostics per document URI.
///
/// A later notification for the same key replaces the earlier one; there is
/// no ordering between keys.
#[derive(Debug, Default)]
pub struct NotificationStore {
    entries: Mutex<HashMap<(String, String), StoredNotification>>,
    changed: Notify,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, method: &str, key: &str, params: Value) {
        let stored = StoredNotification {
            params,
            received_at: Utc::now(),
        };
        self.lock()
            .insert((method.to_string(), key.to_string()), stored);
        self.changed.notify_waiters();
    }

    pub fn latest(&self, method: &str, key: &str) -> Option<StoredNotification> {
        self.lock()
            .get(&(method.to_string(), key.to_string()))
            .cloned()
    }

    /// Current value for the key, or the first one to arrive within
    /// `timeout`. `None` when nothing shows up in time.
    pub async fn wait_for(
        &self,
        method: &str,
        key: &str,
        timeout: Duration,
    ) -> Option<StoredNotification> {
        let deadline = Instant::now().checked_add(timeout);

        loop {
            // Registered before the lookup so an insert in between still wakes us
            let changed = self.changed.notified();

            if let Some(stored) = self.latest(method, key) {
                return Some(stored);
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, changed).await.is_err() {
                        return self.latest(method, key);
                    }
                }
                None => changed.await,
            }
        }
    }

    pub fn keys(&self, method: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(m, _)| m == method)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredNotification>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
