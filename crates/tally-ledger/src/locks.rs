//! # Keyed Async Locks
//!
//! Serializes writers to the same product (or sale) inside one process.
//!
//! ## Ordering
//! ```text
//! create_sale(items: [p3, p1, p3])      cancel_sale(items: [p1, p3])
//!        │                                     │
//!        ▼                                     ▼
//!  keys: [p1, p3]  ─── sorted, deduped ───  keys: [p1, p3]
//!        │                                     │
//!   lock p1 → lock p3                     lock p1 → lock p3
//! ```
//!
//! Every caller acquires in the same total order, so two multi-key
//! operations cannot deadlock. Locks are taken before a pooled connection
//! is, never while holding one.
//!
//! Cross-process writers are not covered here; the compare-and-set stock
//! update catches those.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::trace;

/// Entries kept before idle locks are swept.
const PRUNE_THRESHOLD: usize = 1024;

/// A table of named async mutexes, created on first use.
#[derive(Debug, Default)]
pub struct LockTable {
    entries: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

/// Held locks. Dropping it releases every key.
#[derive(Debug)]
pub struct LockSet {
    keys: Vec<String>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl LockSet {
    /// The keys held, in acquisition order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock key for a sale header.
    pub fn sale_key(sale_id: &str) -> String {
        format!("sale:{}", sale_id)
    }

    /// Acquires every key in sorted order and returns once all are held.
    pub async fn acquire<I, S>(&self, keys: I) -> LockSet
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let mutexes: Vec<Arc<AsyncMutex<()>>> = {
            let mut entries = self.lock_entries();
            if entries.len() > PRUNE_THRESHOLD {
                // Only the table itself references an idle lock.
                entries.retain(|_, m| Arc::strong_count(m) > 1);
            }
            keys.iter()
                .map(|k| entries.entry(k.clone()).or_default().clone())
                .collect()
        };

        let mut guards = Vec::with_capacity(mutexes.len());
        for (key, mutex) in keys.iter().zip(mutexes) {
            trace!(key = %key, "Waiting for lock");
            guards.push(mutex.lock_owned().await);
        }

        LockSet {
            keys,
            _guards: guards,
        }
    }

    /// Number of keys currently tracked.
    pub fn len(&self) -> usize {
        self.lock_entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        // The map is always left consistent, so a poisoned lock is still usable.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_keys_sorted_and_deduped() {
        let table = LockTable::new();
        let set = table.acquire(["p3", "p1", "p3"]).await;
        assert_eq!(set.keys(), &["p1".to_string(), "p3".to_string()]);
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let table = Arc::new(LockTable::new());
        let held = table.acquire(["p1"]).await;

        let t = table.clone();
        let waiter = tokio::spawn(async move {
            let _set = t.acquire(["p1"]).await;
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(held);
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should acquire after release")
            .unwrap();
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let table = LockTable::new();
        let _a = table.acquire(["p1"]).await;
        let b = tokio::time::timeout(Duration::from_millis(200), table.acquire(["p2"])).await;
        assert!(b.is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_opposite_orders_do_not_deadlock() {
        let table = Arc::new(LockTable::new());
        let mut handles = Vec::new();
        for i in 0..20 {
            let t = table.clone();
            handles.push(tokio::spawn(async move {
                let keys = if i % 2 == 0 { ["a", "b"] } else { ["b", "a"] };
                let _set = t.acquire(keys).await;
                tokio::task::yield_now().await;
            }));
        }

        let all = async {
            for h in handles {
                h.await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(5), all)
            .await
            .expect("no deadlock");
    }

    #[test]
    fn test_sale_key_namespace() {
        assert_eq!(LockTable::sale_key("abc"), "sale:abc");
    }
}
