//! In-flight request bookkeeping

use crate::types::RpcError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub type Completion = oneshot::Sender<Result<Value, RpcError>>;

/// One outstanding request awaiting its response.
#[derive(Debug)]
pub struct PendingRequest {
    pub id: u64,
    pub method: String,
    pub created_at: DateTime<Utc>,
    pub deadline: Option<Instant>,
    completion: Completion,
}

/// Id allocator plus the map of outstanding requests for one connection.
///
/// Ids start at 1 and are never reused for the lifetime of the table, so a
/// late response to a timed-out request can never complete a newer one.
#[derive(Debug)]
pub struct PendingTable {
    next_id: u64,
    entries: HashMap<u64, PendingRequest>,
}

impl Default for PendingTable {
    fn default() -> Self {
        Self {
            next_id: 1,
            entries: HashMap::new(),
        }
    }
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and record its completion handle.
    pub fn register(
        &mut self,
        method: &str,
        deadline: Option<Instant>,
    ) -> (u64, oneshot::Receiver<Result<Value, RpcError>>) {
        let id = self.next_id;
        self.next_id += 1;

        let (tx, rx) = oneshot::channel();
        self.entries.insert(
            id,
            PendingRequest {
                id,
                method: method.to_string(),
                created_at: Utc::now(),
                deadline,
                completion: tx,
            },
        );
        (id, rx)
    }

    /// Complete and remove the entry. Returns `false` for unknown ids,
    /// including ones that already timed out or were resolved.
    pub fn resolve(&mut self, id: u64, result: Result<Value, RpcError>) -> bool {
        match self.entries.remove(&id) {
            Some(entry) => {
                // The caller may have stopped waiting
                let _ = entry.completion.send(result);
                true
            }
            None => false,
        }
    }

    /// Drop an entry without completing it (timeout or write failure).
    pub fn remove(&mut self, id: u64) -> Option<PendingRequest> {
        self.entries.remove(&id)
    }

    /// Fail every outstanding request; returns how many were failed.
    pub fn fail_all(&mut self, mut error: impl FnMut(&PendingRequest) -> RpcError) -> usize {
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            let err = error(&entry);
            let _ = entry.completion.send(Err(err));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_are_monotonic_from_one() {
        let mut table = PendingTable::new();
        let (a, _ra) = table.register("initialize", None);
        let (b, _rb) = table.register("tools/list", None);
        table.remove(b);
        let (c, _rc) = table.register("tools/list", None);
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[tokio::test]
    async fn test_resolve_only_once() {
        let mut table = PendingTable::new();
        let (id, rx) = table.register("ping", None);

        assert!(table.resolve(id, Ok(json!({}))));
        assert!(!table.resolve(id, Ok(json!({"again": true}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({}));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_fail_all_resolves_everything() {
        let mut table = PendingTable::new();
        let receivers: Vec<_> = (0..4).map(|_| table.register("tools/call", None).1).collect();

        let failed = table.fail_all(|entry| RpcError::Cancelled(format!("{} stopped", entry.method)));
        assert_eq!(failed, 4);
        assert_eq!(table.len(), 0);

        for rx in receivers {
            assert!(matches!(rx.await.unwrap(), Err(RpcError::Cancelled(_))));
        }
    }

    #[test]
    fn test_resolve_after_receiver_dropped_is_harmless() {
        let mut table = PendingTable::new();
        let (id, rx) = table.register("ping", None);
        drop(rx);
        assert!(table.resolve(id, Ok(json!(null))));
    }
}
