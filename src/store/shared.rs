//! Fail-open adapter over a remote key-value store.
//!
//! Every call runs under a bounded deadline. Any failure (no connection,
//! timeout, protocol error) is logged at error level and swallowed: reads
//! come back absent, writes report success, increments return `None`.
//!
//! A store that starts without a connection can keep retrying in the
//! background and picks the client up as soon as one is established.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use super::CounterStore;
use crate::observability::metrics;

/// Upper bound on the wall-clock time of a single store call.
pub const MAX_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Failures of the remote store. Never crosses the [`CounterStore`] boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store is not connected")]
    NotConnected,

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Raw, fallible protocol of the remote store.
#[async_trait]
pub trait KvClient: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// INCR and attach the expiry to a fresh key, as one atomic step.
    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError>;
}

type Slot = Option<Arc<dyn KvClient>>;

/// Fail-open [`CounterStore`] backed by a [`KvClient`].
#[derive(Clone)]
pub struct SharedStore {
    client: watch::Receiver<Slot>,
    op_timeout: Duration,
}

impl SharedStore {
    pub fn new(client: Arc<dyn KvClient>) -> Self {
        Self::with_slot(Some(client))
    }

    /// A store whose connection could not be established. Every call fails open.
    pub fn disconnected() -> Self {
        Self::with_slot(None)
    }

    /// A disconnected store that calls `connect` every `interval` until it
    /// succeeds. Must be called inside a Tokio runtime.
    pub fn reconnecting<F, Fut>(connect: F, interval: Duration) -> Self
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Arc<dyn KvClient>, StoreError>> + Send + 'static,
    {
        let (tx, rx) = watch::channel(None);
        let interval = interval.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut attempt: u32 = 0;
            loop {
                tokio::time::sleep(interval).await;
                if tx.is_closed() {
                    return;
                }
                attempt += 1;
                let result = match tokio::time::timeout(interval, connect()).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout(interval)),
                };
                match result {
                    Ok(client) => {
                        tracing::info!(attempt, "Counter store reconnected, rate limiting resumed");
                        let _ = tx.send(Some(client));
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(attempt, error = %e, "Counter store still unreachable, admitting all traffic");
                    }
                }
            }
        });

        Self {
            client: rx,
            op_timeout: MAX_OP_TIMEOUT,
        }
    }

    fn with_slot(slot: Slot) -> Self {
        let (_, rx) = watch::channel(slot);
        Self {
            client: rx,
            op_timeout: MAX_OP_TIMEOUT,
        }
    }

    /// Set the per-call deadline, clamped to [`MAX_OP_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout.clamp(Duration::from_millis(1), MAX_OP_TIMEOUT);
        self
    }

    pub fn is_connected(&self) -> bool {
        self.client.borrow().is_some()
    }

    pub fn op_timeout(&self) -> Duration {
        self.op_timeout
    }

    fn client(&self, op: &'static str, key: &str) -> Option<Arc<dyn KvClient>> {
        let client = self.client.borrow().clone();
        if client.is_none() {
            report(op, key, &StoreError::NotConnected);
        }
        client
    }

    async fn guarded<T, F>(&self, op: &'static str, key: &str, call: F) -> Option<T>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.op_timeout, call).await {
            Ok(Ok(value)) => Some(value),
            Ok(Err(e)) => {
                report(op, key, &e);
                None
            }
            Err(_) => {
                report(op, key, &StoreError::Timeout(self.op_timeout));
                None
            }
        }
    }
}

fn report(op: &'static str, key: &str, error: &StoreError) {
    tracing::error!(op, key, error = %error, "Counter store unavailable, failing open");
    metrics::record_store_error(op);
}

#[async_trait]
impl CounterStore for SharedStore {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let client = self.client("get", key)?;
        self.guarded("get", key, client.get(key)).await.flatten()
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) {
        if let Some(client) = self.client("set", key) {
            self.guarded("set", key, client.set(key, &value, ttl)).await;
        }
    }

    async fn delete(&self, key: &str) {
        if let Some(client) = self.client("delete", key) {
            self.guarded("delete", key, client.delete(key)).await;
        }
    }

    async fn reset(&self) {}

    async fn close(&self) {}

    async fn increment(&self, key: &str, window: Duration) -> Option<u64> {
        let client = self.client("increment", key)?;
        self.guarded("increment", key, client.incr_with_expiry(key, window))
            .await
    }
}
