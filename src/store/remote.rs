//! Redis-backed [`KvClient`].
//!
//! Wraps a `ConnectionManager`, which reconnects on its own. The connection is
//! created and owned by the bootstrap layer; this adapter never closes it.
//!
//! Counters are bumped by a server-side script, so the increment and its expiry
//! land together even when the caller gives up waiting halfway through.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;

use super::shared::{KvClient, StoreError};

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// INCR, then attach the window to a fresh key. A key that somehow lost its
/// TTL gets one again on the next hit instead of counting forever.
const INCR_WITH_EXPIRY: &str = r"
local count = redis.call('INCR', KEYS[1])
if count == 1 or redis.call('PTTL', KEYS[1]) == -1 then
    redis.call('PEXPIRE', KEYS[1], ARGV[1])
end
return count
";

/// Remote key-value client speaking the Redis protocol.
#[derive(Clone)]
pub struct RedisKv {
    conn: ConnectionManager,
    incr_script: Arc<Script>,
}

impl RedisKv {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            incr_script: Arc::new(Script::new(INCR_WITH_EXPIRY)),
        }
    }

    /// Open a managed connection to `url`.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        tracing::info!(url = %redact(url), "Connected to counter store");
        Ok(Self::new(conn))
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Strip credentials from a connection URL before logging it.
fn redact(url: &str) -> String {
    match url::Url::parse(url) {
        Ok(mut parsed) => {
            if parsed.password().is_some() {
                let _ = parsed.set_password(Some("***"));
            }
            parsed.to_string()
        }
        Err(_) => "<unparseable>".to_string(),
    }
}

#[async_trait]
impl KvClient for RedisKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if !ttl.is_zero() {
            cmd.arg("PX").arg(ttl_millis(ttl));
        }
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn incr_with_expiry(&self, key: &str, window: Duration) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let count: u64 = self
            .incr_script
            .key(key)
            .arg(ttl_millis(window))
            .invoke_async(&mut conn)
            .await?;
        Ok(count)
    }
}
