//! Redis remote tier.

use super::backend::{remote_expiry_millis, RemoteStore};
use crate::error::TierError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;

pub(crate) fn map_redis_error(e: redis::RedisError) -> TierError {
    if e.is_timeout() {
        TierError::Timeout(Duration::ZERO)
    } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
        TierError::Unavailable(e.to_string())
    } else {
        TierError::Backend(e.to_string())
    }
}

/// Cursor through `SCAN ... MATCH pattern` until exhausted.
pub(crate) async fn scan_keys(
    conn: &ConnectionManager,
    pattern: &str,
) -> Result<Vec<String>, TierError> {
    let mut conn = conn.clone();
    let mut cursor: u64 = 0;
    let mut keys = Vec::new();
    loop {
        let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(500)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        keys.extend(batch);
        if next == 0 {
            break;
        }
        cursor = next;
    }
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// `RemoteStore` over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    pub async fn connect(url: &str) -> Result<Self, TierError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;
        tracing::info!("connected to redis remote tier");
        Ok(Self::new(conn))
    }

    pub fn connection(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

#[async_trait]
impl RemoteStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, TierError> {
        let mut conn = self.conn.clone();
        conn.get::<_, Option<Vec<u8>>>(key)
            .await
            .map_err(map_redis_error)
    }

    async fn set_ex(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), TierError> {
        let mut conn = self.conn.clone();
        conn.pset_ex::<_, _, ()>(key, value, remote_expiry_millis(ttl))
            .await
            .map_err(map_redis_error)
    }

    async fn del(&self, key: &str) -> Result<bool, TierError> {
        let mut conn = self.conn.clone();
        let removed: usize = conn.del(key).await.map_err(map_redis_error)?;
        Ok(removed > 0)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, TierError> {
        scan_keys(&self.conn, pattern).await
    }

    async fn ping(&self) -> Result<(), TierError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map(|_| ())
            .map_err(map_redis_error)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
