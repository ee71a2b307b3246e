//! Redis cache backend.
//!
//! Each entry is a hash:
//! - `data`: the payload
//! - `sld`: sliding window in milliseconds, `-1` when not sliding
//! - `abs`: absolute expiry as unix milliseconds, `-1` when unset
//!
//! The key's own TTL is always set with `PEXPIRE`, so Redis evicts on its
//! own; `sld` lets any process renew a sliding entry on read.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;

use super::store::{CacheError, CacheStore, TtlPolicy};

const DATA_FIELD: &str = "data";
const SLIDING_FIELD: &str = "sld";
const ABSOLUTE_FIELD: &str = "abs";
const NOT_SET: i64 = -1;
const SCAN_BATCH: usize = 500;

#[derive(Clone)]
pub struct RedisCacheStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for RedisCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCacheStore").finish_non_exhaustive()
    }
}

impl RedisCacheStore {
    /// Connect and keep a self-healing multiplexed connection.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("Connected to Redis cache backend");
        Ok(Self { conn })
    }

    async fn pexpire(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn sliding_window(&self, key: &str) -> Result<Option<Duration>, CacheError> {
        let mut conn = self.conn.clone();
        let sliding: Option<i64> = redis::cmd("HGET")
            .arg(key)
            .arg(SLIDING_FIELD)
            .query_async(&mut conn)
            .await?;
        Ok(sliding
            .filter(|ms| *ms > 0)
            .map(|ms| Duration::from_millis(ms as u64)))
    }
}

fn millis(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX).max(1)
}

fn unix_millis(at: SystemTime) -> i64 {
    at.duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn.clone();
        let (data, sliding): (Option<String>, Option<i64>) = redis::cmd("HMGET")
            .arg(key)
            .arg(DATA_FIELD)
            .arg(SLIDING_FIELD)
            .query_async(&mut conn)
            .await?;

        if data.is_some() {
            if let Some(ms) = sliding.filter(|ms| *ms > 0) {
                self.pexpire(key, Duration::from_millis(ms as u64)).await?;
            }
        }
        Ok(data)
    }

    async fn set_string(&self, key: &str, value: &str, ttl: TtlPolicy) -> Result<(), CacheError> {
        let (remaining, sliding) = ttl.resolve()?;
        let absolute = match ttl {
            TtlPolicy::Absolute(at) => unix_millis(at),
            _ => NOT_SET,
        };
        let sliding_ms = sliding.map(millis).unwrap_or(NOT_SET);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("DEL")
            .arg(key)
            .ignore()
            .cmd("HSET")
            .arg(key)
            .arg(DATA_FIELD)
            .arg(value)
            .arg(SLIDING_FIELD)
            .arg(sliding_ms)
            .arg(ABSOLUTE_FIELD)
            .arg(absolute)
            .ignore();
        if let Some(remaining) = remaining {
            pipe.cmd("PEXPIRE").arg(key).arg(millis(remaining)).ignore();
        }

        let mut conn = self.conn.clone();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }

    async fn refresh(&self, key: &str) -> Result<(), CacheError> {
        if let Some(window) = self.sliding_window(key).await? {
            self.pexpire(key, window).await?;
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn.clone();
        let count: i64 = redis::cmd("EXISTS").arg(key).query_async(&mut conn).await?;
        Ok(count > 0)
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let pattern = format!("{}*", escape_glob(prefix));
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut removed = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            if !keys.is_empty() {
                let deleted: i64 = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
                removed += deleted.max(0) as usize;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(prefix, removed, "Removed cache keys by prefix");
        Ok(removed)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

/// Escape glob metacharacters so the prefix matches literally.
fn escape_glob(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
