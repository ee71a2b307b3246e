//! Cache adapter contract.
//!
//! A string key/value store with TTL semantics. The cache service layers
//! serialization and stampede protection on top; adapters only move strings.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use thiserror::Error;

/// Expiration policy for one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtlPolicy {
    /// Expire at a wall-clock instant.
    Absolute(SystemTime),
    /// Expire a fixed time after being written.
    RelativeToNow(Duration),
    /// Expire after this long without a read or refresh.
    Sliding(Duration),
    /// Never expire.
    None,
}

impl TtlPolicy {
    /// Time from now until expiry, and the sliding window if any.
    ///
    /// Fails for an absolute instant that has already passed.
    pub fn resolve(&self) -> Result<(Option<Duration>, Option<Duration>), CacheError> {
        match *self {
            TtlPolicy::Absolute(at) => match at.duration_since(SystemTime::now()) {
                Ok(remaining) if !remaining.is_zero() => Ok((Some(remaining), None)),
                _ => Err(CacheError::InvalidExpiration),
            },
            TtlPolicy::RelativeToNow(ttl) => Ok((Some(ttl), None)),
            TtlPolicy::Sliding(window) => Ok((Some(window), Some(window))),
            TtlPolicy::None => Ok((None, None)),
        }
    }
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("absolute expiration is in the past")]
    InvalidExpiration,

    #[error("operation not supported by this cache backend: {0}")]
    Unsupported(&'static str),

    #[error("cache backend error: {0}")]
    Backend(String),

    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for CacheError {
    fn from(e: redis::RedisError) -> Self {
        CacheError::Backend(e.to_string())
    }
}

/// A TTL-capable string key/value backend.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_string(&self, key: &str, value: &str, ttl: TtlPolicy) -> Result<(), CacheError>;

    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Restart the sliding window without rewriting the value.
    async fn refresh(&self, key: &str) -> Result<(), CacheError>;

    async fn exists(&self, key: &str) -> Result<bool, CacheError>;

    /// Remove every key starting with `prefix`. Returns how many were removed.
    async fn remove_by_prefix(&self, _prefix: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unsupported("remove_by_prefix"))
    }

    /// Backend name for logs.
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_policies() {
        let minute = Duration::from_secs(60);
        assert_eq!(
            TtlPolicy::RelativeToNow(minute).resolve().unwrap(),
            (Some(minute), None)
        );
        assert_eq!(
            TtlPolicy::Sliding(minute).resolve().unwrap(),
            (Some(minute), Some(minute))
        );
        assert_eq!(TtlPolicy::None.resolve().unwrap(), (None, None));

        let (remaining, sliding) = TtlPolicy::Absolute(SystemTime::now() + minute)
            .resolve()
            .unwrap();
        assert!(remaining.unwrap() <= minute);
        assert!(sliding.is_none());
    }

    #[test]
    fn test_absolute_in_past_is_rejected() {
        let past = SystemTime::now() - Duration::from_secs(1);
        assert!(matches!(
            TtlPolicy::Absolute(past).resolve(),
            Err(CacheError::InvalidExpiration)
        ));
    }
}
