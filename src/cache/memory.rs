//! In-process cache backend.
//!
//! # Design Decisions
//! - `DashMap` for sharded concurrent access; no global lock
//! - Expiry is checked lazily on every read, and a sweeper task purges
//!   whatever nobody reads
//! - Sliding entries renew on read and on refresh

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;
use tokio::time;

use super::store::{CacheError, CacheStore, TtlPolicy};

#[derive(Debug, Clone)]
struct StoredEntry {
    value: Arc<str>,
    expires_at: Option<Instant>,
    sliding: Option<Duration>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn touch(&mut self, now: Instant) {
        if let Some(window) = self.sliding {
            self.expires_at = Some(now + window);
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries held, expired ones included until swept.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    /// Periodically purge expired entries until shutdown.
    pub async fn run_sweeper(self: Arc<Self>, interval: Duration, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        tracing::debug!(interval_secs = interval.as_secs(), "Cache sweeper starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, remaining = self.entries.len(), "Purged expired cache entries");
                    }
                }
                _ = shutdown.recv() => {
                    tracing::debug!("Cache sweeper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let value = match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.touch(now);
                Some(entry.value.to_string())
            }
            Some(_) => None,
            None => return Ok(None),
        };
        if value.is_none() {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(value)
    }

    async fn set_string(&self, key: &str, value: &str, ttl: TtlPolicy) -> Result<(), CacheError> {
        let (remaining, sliding) = ttl.resolve()?;
        let entry = StoredEntry {
            value: Arc::from(value),
            expires_at: remaining.map(|r| Instant::now() + r),
            sliding,
        };
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.entries.remove(key);
        Ok(())
    }

    async fn refresh(&self, key: &str) -> Result<(), CacheError> {
        let now = Instant::now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.touch(now);
            }
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn remove_by_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        let before = self.entries.len();
        self.entries.retain(|key, _| !key.starts_with(prefix));
        Ok(before.saturating_sub(self.entries.len()))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
