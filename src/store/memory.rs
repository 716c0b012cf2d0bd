//! In-process counter store.
//!
//! Suitable for single-instance deployments. `DashMap` shards its locks, so
//! each read-modify-write on a key happens under that key's shard lock and is
//! linearizable per key. Expired entries read as absent and are removed by a
//! periodic sweeper rather than per-entry timers.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::task::JoinHandle;

use super::{decode_count, CounterStore};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration, now: Instant) -> Self {
        let expires_at = if ttl.is_zero() { None } else { Some(now + ttl) };
        Self { value, expires_at }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// A thread-safe in-memory key-value store with per-key expiry.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a background task that evicts expired entries every `interval`.
    ///
    /// The task holds only a weak reference and exits once every clone of the
    /// store has been dropped. Must be called from within a Tokio runtime.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let entries = Arc::downgrade(&self.entries);
        let interval = interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // First tick fires immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(entries) = Weak::upgrade(&entries) else {
                    tracing::debug!("Counter store dropped, sweeper exiting");
                    break;
                };
                let evicted = sweep_map(&entries);
                if evicted > 0 {
                    tracing::debug!(evicted, remaining = entries.len(), "Evicted expired counters");
                }
            }
        })
    }

    /// Remove expired entries now. Returns how many were evicted.
    pub fn sweep(&self) -> usize {
        sweep_map(&self.entries)
    }

    /// Number of entries currently held, including not-yet-swept expired ones.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sweep_map(entries: &DashMap<String, Entry>) -> usize {
    let now = Instant::now();
    let before = entries.len();
    entries.retain(|_, entry| !entry.is_expired(now));
    before.saturating_sub(entries.len())
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        self.entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        self.entries
            .insert(key.to_string(), Entry::new(value, ttl, Instant::now()));
    }

    async fn delete(&self, key: &str) {
        self.entries.remove(key);
    }

    async fn reset(&self) {
        self.entries.clear();
    }

    async fn close(&self) {}

    async fn increment(&self, key: &str, window: Duration) -> Option<u64> {
        let now = Instant::now();
        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(b"0".to_vec(), window, now));

        if entry.is_expired(now) {
            *entry = Entry::new(b"0".to_vec(), window, now);
        }

        let count = decode_count(&entry.value).saturating_add(1);
        entry.value = count.to_string().into_bytes();
        Some(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.get("k").await.is_none());

        store.set("k", b"v".to_vec(), Duration::ZERO).await;
        assert_eq!(store.get("k").await.as_deref(), Some(&b"v"[..]));

        store.delete("k").await;
        assert!(store.get("k").await.is_none());
    }

    #[tokio::test]
    async fn test_expired_value_reads_absent() {
        let store = MemoryStore::new();
        store.set("k", b"v".to_vec(), Duration::from_millis(20)).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.get("k").await.is_none());
        assert_eq!(store.sweep(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_increment_counts_within_window() {
        let store = MemoryStore::new();
        let window = Duration::from_secs(60);
        assert_eq!(store.increment("global:1.2.3.4", window).await, Some(1));
        assert_eq!(store.increment("global:1.2.3.4", window).await, Some(2));
        assert_eq!(store.increment("export:1.2.3.4", window).await, Some(1));
        assert_eq!(store.get("global:1.2.3.4").await.as_deref(), Some(&b"2"[..]));
    }

    #[tokio::test]
    async fn test_increment_restarts_after_window() {
        let store = MemoryStore::new();
        let window = Duration::from_millis(20);
        store.increment("k", window).await;
        store.increment("k", window).await;
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(store.increment("k", window).await, Some(1));
    }

    #[tokio::test]
    async fn test_concurrent_increments_are_not_lost() {
        let store = MemoryStore::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..50 {
                    store.increment("k", Duration::from_secs(60)).await;
                }
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(store.increment("k", Duration::from_secs(60)).await, Some(401));
    }

    #[tokio::test]
    async fn test_sweeper_evicts_in_background() {
        let store = MemoryStore::new();
        let handle = store.spawn_sweeper(Duration::from_millis(20));
        store.set("k", b"v".to_vec(), Duration::from_millis(10)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(store.is_empty());
        handle.abort();
    }

    #[tokio::test]
    async fn test_reset_clears_everything() {
        let store = MemoryStore::new();
        store.set("a", b"1".to_vec(), Duration::ZERO).await;
        store.set("b", b"2".to_vec(), Duration::ZERO).await;
        store.reset().await;
        assert!(store.is_empty());
    }
}
