//! Shared-counter storage.
//!
//! # Data Flow
//! ```text
//! rate limiter
//!     → CounterStore (trait object)
//!         → memory.rs  (in-process DashMap, single instance)
//!         → shared.rs  (fail-open adapter, 2s budget per call)
//!             → remote.rs (Redis-backed KV)
//! ```
//!
//! # Design Decisions
//! - Fail open: a store outage admits traffic, it never rejects it
//! - Store errors are logged and counted, never returned
//! - Counter layout is owned by the store; callers only see `u64` counts

use std::time::Duration;

use async_trait::async_trait;

pub mod memory;
pub mod remote;
pub mod shared;

pub use memory::MemoryStore;
pub use remote::RedisKv;
pub use shared::{KvClient, SharedStore, StoreError, MAX_OP_TIMEOUT};

/// Key-value capability the rate limiter is polymorphic over.
///
/// None of these operations can fail from the caller's point of view. A value
/// that cannot be read is reported as absent, and an increment that cannot be
/// performed returns `None`, which the limiter treats as "admit".
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Return the stored value, or `None` when absent, expired or unreachable.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, expiring after `ttl` (zero means no expiry).
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration);

    async fn delete(&self, key: &str);

    async fn reset(&self);

    /// Lifecycle of any underlying client belongs to the bootstrap layer.
    async fn close(&self);

    /// Atomically increment the counter at `key` and return the new count.
    ///
    /// The expiry is set to `window` only when the key is created, so a
    /// counter never outlives the window it was opened in.
    async fn increment(&self, key: &str, window: Duration) -> Option<u64>;
}

/// Decode a counter payload.
///
/// Both store variants keep counters as the decimal text `INCR` produces.
pub fn decode_count(value: &[u8]) -> u64 {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .unwrap_or(0)
}
