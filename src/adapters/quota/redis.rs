//! Redis-backed quota store for multi-instance deployments.
//!
//! One integer key per pair and month: `{prefix}:{low}:{high}:{YYYY-MM}`.
//! The clamped add is a Lua script so concurrent commits from any number
//! of instances stay under the cap.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};

use crate::domain::quota::{MonthKey, PairKey};
use crate::ports::{QuotaStore, QuotaStoreError};

/// Keys outlive their month by a few days, then Redis drops them.
const KEY_TTL_SECS: i64 = 40 * 24 * 3600;

const ADD_CLAMPED: &str = r#"
local used = tonumber(redis.call('GET', KEYS[1]) or '0')
local total = used + tonumber(ARGV[1])
local cap = tonumber(ARGV[2])
if total > cap then total = cap end
redis.call('SET', KEYS[1], total, 'EX', ARGV[3])
return total
"#;

/// Quota counters stored in Redis.
#[derive(Clone)]
pub struct RedisQuotaStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    add_script: Script,
}

impl RedisQuotaStore {
    pub fn new(conn: MultiplexedConnection, key_prefix: impl Into<String>) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.into(),
            add_script: Script::new(ADD_CLAMPED),
        }
    }

    fn key(&self, pair: &PairKey, month: MonthKey) -> String {
        redis_key(&self.key_prefix, pair, month)
    }
}

fn redis_key(prefix: &str, pair: &PairKey, month: MonthKey) -> String {
    format!("{}:{}:{}", prefix, pair, month)
}

fn to_seconds(key: &str, raw: i64) -> Result<u32, QuotaStoreError> {
    u32::try_from(raw).map_err(|_| QuotaStoreError::Corrupt {
        key: key.to_string(),
        reason: format!("{} is not a valid second count", raw),
    })
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn used_seconds(&self, pair: &PairKey, month: MonthKey) -> Result<u32, QuotaStoreError> {
        let key = self.key(pair, month);
        let mut conn = self.conn.clone();

        let raw: Option<i64> = conn
            .get(&key)
            .await
            .map_err(|e: redis::RedisError| QuotaStoreError::Unavailable(e.to_string()))?;

        to_seconds(&key, raw.unwrap_or(0))
    }

    async fn add_clamped(
        &self,
        pair: &PairKey,
        month: MonthKey,
        seconds: u32,
        cap_seconds: u32,
    ) -> Result<u32, QuotaStoreError> {
        let key = self.key(pair, month);
        let mut conn = self.conn.clone();

        let raw: i64 = self
            .add_script
            .key(&key)
            .arg(seconds)
            .arg(cap_seconds)
            .arg(KEY_TTL_SECS)
            .invoke_async(&mut conn)
            .await
            .map_err(|e: redis::RedisError| QuotaStoreError::Unavailable(e.to_string()))?;

        tracing::trace!(key = %key, seconds, used_seconds = raw, "Redis quota updated");
        to_seconds(&key, raw)
    }
}
