//! Shared request history in Redis sorted sets.
//!
//! One sorted set per bucket, scored by arrival millis. Prune + count run in
//! one MULTI block; the admission write is a second round trip, so two
//! instances racing on the same bucket may both admit. That is accepted.

use super::history::{Admission, HistoryStore};
use super::rate_limiter::{WindowCounts, WindowPolicy};
use crate::cache::redis_store::map_redis_error;
use crate::clock::{DAY_MS, HOUR_MS, MINUTE_MS};
use crate::error::TierError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;

pub struct RedisHistoryStore {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisHistoryStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
        }
    }

    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self, TierError> {
        let client = redis::Client::open(url).map_err(map_redis_error)?;
        let conn = client
            .get_connection_manager()
            .await
            .map_err(map_redis_error)?;
        Ok(Self::new(conn, prefix))
    }

    fn key(&self, bucket: &str) -> String {
        format!("{}:ratelimit:{}", self.prefix, bucket)
    }
}

fn exclusive_floor(now_ms: u64, window_ms: u64) -> String {
    format!("({}", now_ms.saturating_sub(window_ms))
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn check_and_record(
        &self,
        bucket: &str,
        now_ms: u64,
        policy: &WindowPolicy,
    ) -> Result<Admission, TierError> {
        let key = self.key(bucket);
        let mut conn = self.conn.clone();

        let (minute, hour, day): (u32, u32, u32) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&key)
            .arg("-inf")
            .arg(now_ms.saturating_sub(DAY_MS))
            .ignore()
            .cmd("ZCOUNT")
            .arg(&key)
            .arg(exclusive_floor(now_ms, MINUTE_MS))
            .arg("+inf")
            .cmd("ZCOUNT")
            .arg(&key)
            .arg(exclusive_floor(now_ms, HOUR_MS))
            .arg("+inf")
            .cmd("ZCOUNT")
            .arg(&key)
            .arg(exclusive_floor(now_ms, DAY_MS))
            .arg("+inf")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let before = WindowCounts { minute, hour, day };
        let verdict = policy.evaluate(&before);
        if !verdict.is_admitted() {
            return Ok(Admission {
                verdict,
                counts: before,
            });
        }

        let member = format!("{}-{}", now_ms, uuid::Uuid::new_v4());
        redis::pipe()
            .atomic()
            .cmd("ZADD")
            .arg(&key)
            .arg(now_ms)
            .arg(member)
            .ignore()
            .cmd("PEXPIRE")
            .arg(&key)
            .arg(DAY_MS)
            .ignore()
            .query_async::<()>(&mut conn)
            .await
            .map_err(map_redis_error)?;

        Ok(Admission {
            verdict,
            counts: WindowCounts {
                minute: minute + 1,
                hour: hour + 1,
                day: day + 1,
            },
        })
    }

    // Buckets carry PEXPIRE of one day, Redis drops idle ones itself.
    async fn sweep(&self, _now_ms: u64) -> Result<usize, TierError> {
        Ok(0)
    }

    async fn bucket_count(&self) -> Result<usize, TierError> {
        let pattern = format!("{}:ratelimit:*", self.prefix);
        let keys = crate::cache::redis_store::scan_keys(&self.conn, &pattern).await?;
        Ok(keys.len())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
