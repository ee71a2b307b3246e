//! Stampede-safe typed cache over a [`CacheStore`].
//!
//! # Responsibilities
//! - Serialize values to and from the string backend (`serde_json`)
//! - Regenerate a missing value at most once per key at a time
//! - Cache confirmed absence with a null marker for a short TTL
//! - Keep callers working when the backend fails
//!
//! # Data Flow
//! ```text
//! get_or_set(key)
//!     → fast path: backend hit → done
//!     → per-key lock (DashMap<String, Arc<Mutex<Option<Regenerated>>>>)
//!     → outcome published by an earlier holder → done
//!     → re-check backend (another holder may have filled it)
//!     → factory → store value or null marker, publish outcome
//!     → release; last holder removes the lock entry
//! ```
//!
//! # Design Decisions
//! - Lock entries are created on demand and removed by whichever lease drops
//!   last, so the table only holds keys under contention
//! - The holder leaves its outcome in the lock entry, so callers queued
//!   behind it get the same answer even when nothing was cached (a `None`
//!   without null protection, or a failing backend)
//! - Backend errors degrade to a miss (or a no-op for writes) with a warning;
//!   factory errors always reach the caller

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use crate::cache::store::{CacheError, CacheStore, TtlPolicy};
use crate::config::CacheConfig;
use crate::observability::metrics;

/// Stored in place of a value to mean "confirmed absent". Not valid JSON.
pub const NULL_MARKER: &str = "@@null@@";

pub const DEFAULT_NULL_TTL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    pub default_ttl: Duration,
    pub null_ttl: Duration,
    /// Upper bound on waiting for another caller's regeneration.
    pub lock_timeout: Option<Duration>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(1800),
            null_ttl: DEFAULT_NULL_TTL,
            lock_timeout: None,
        }
    }
}

impl From<&CacheConfig> for CacheSettings {
    fn from(config: &CacheConfig) -> Self {
        Self {
            default_ttl: config.default_ttl(),
            null_ttl: config.null_ttl(),
            lock_timeout: config.lock_timeout(),
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Null,
    Miss,
}

/// Serialized factory result left behind by a lock holder. `None` means
/// the factory found nothing.
struct Regenerated(Option<String>);

type KeyLock = Arc<Mutex<Option<Regenerated>>>;
type LockTable = DashMap<String, KeyLock>;

/// Holds one reference to a key's lock; the last lease out removes the entry.
struct KeyLockLease<'a> {
    locks: &'a LockTable,
    key: &'a str,
    lock: KeyLock,
}

impl<'a> KeyLockLease<'a> {
    fn acquire(locks: &'a LockTable, key: &'a str) -> Self {
        let lock = locks.entry(key.to_string()).or_default().clone();
        Self { locks, key, lock }
    }
}

impl Drop for KeyLockLease<'_> {
    fn drop(&mut self) {
        // One reference in the table, one in this lease: nobody else holds or
        // waits on the lock.
        self.locks
            .remove_if(self.key, |_, lock| Arc::strong_count(lock) == 2);
    }
}

pub struct CacheService {
    store: Arc<dyn CacheStore>,
    locks: LockTable,
    settings: CacheSettings,
}

impl std::fmt::Debug for CacheService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheService")
            .field("backend", &self.store.name())
            .field("settings", &self.settings)
            .field("pending_locks", &self.locks.len())
            .finish()
    }
}

impl CacheService {
    pub fn new(store: Arc<dyn CacheStore>, settings: CacheSettings) -> Self {
        Self {
            store,
            locks: DashMap::new(),
            settings,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.name()
    }

    /// Keys with a live lock entry. Zero whenever no regeneration is running.
    pub fn pending_locks(&self) -> usize {
        self.locks.len()
    }

    /// Cached value, or `None` for a miss or a null marker.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        match self.lookup(key).await {
            Lookup::Hit(value) => Some(value),
            Lookup::Null | Lookup::Miss => None,
        }
    }

    /// Store `value` under `ttl`, or the default relative TTL when `None`.
    /// Returns whether the backend accepted the write.
    ///
    /// A value that serializes to JSON `null` is not stored.
    pub async fn set<T: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<TtlPolicy>,
    ) -> bool {
        match self.encode(key, value) {
            Some(payload) if payload != "null" => self.write_value(key, &payload, ttl).await,
            _ => false,
        }
    }

    /// Cached value, or the factory's result stored for `ttl`.
    ///
    /// Concurrent callers for the same key run the factory once; the rest
    /// wait and receive its result. A `None` result is handed to the callers
    /// already waiting but is not cached.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<TtlPolicy>,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        self.load(key, factory, ttl, None).await
    }

    /// Like [`get_or_set`](Self::get_or_set), but a `None` result is cached
    /// as a null marker for `null_ttl` (the configured null TTL when `None`).
    /// While the marker lives the factory is not called.
    pub async fn get_or_set_with_null_protection<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<TtlPolicy>,
        null_ttl: Option<Duration>,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        let null_ttl = null_ttl.unwrap_or(self.settings.null_ttl);
        self.load(key, factory, ttl, Some(null_ttl)).await
    }

    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            self.backend_failed("remove", key, &e);
        }
    }

    pub async fn exists(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(exists) => exists,
            Err(e) => {
                self.backend_failed("exists", key, &e);
                false
            }
        }
    }

    /// Restart a sliding entry's window.
    pub async fn refresh(&self, key: &str) {
        if let Err(e) = self.store.refresh(key).await {
            self.backend_failed("refresh", key, &e);
        }
    }

    /// Best-effort bulk eviction. Returns how many keys were removed.
    pub async fn remove_by_prefix(&self, prefix: &str) -> usize {
        match self.store.remove_by_prefix(prefix).await {
            Ok(removed) => {
                tracing::debug!(prefix, removed, "Evicted cache keys by prefix");
                removed
            }
            Err(CacheError::Unsupported(_)) => {
                tracing::info!(
                    prefix,
                    backend = self.store.name(),
                    "Cache backend cannot remove by prefix, skipping"
                );
                0
            }
            Err(e) => {
                self.backend_failed("remove_by_prefix", prefix, &e);
                0
            }
        }
    }

    async fn load<T, F, Fut, E>(
        &self,
        key: &str,
        factory: F,
        ttl: Option<TtlPolicy>,
        null_ttl: Option<Duration>,
    ) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        match self.lookup(key).await {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Null => return Ok(None),
            Lookup::Miss => {}
        }

        let lease = KeyLockLease::acquire(&self.locks, key);
        let mut guard = self.wait_for_lock(&lease).await;

        if let Some(Regenerated(payload)) = guard.as_deref().and_then(Option::as_ref) {
            match payload {
                None => return Ok(None),
                Some(payload) => match serde_json::from_str(payload) {
                    Ok(value) => return Ok(Some(value)),
                    Err(e) => {
                        tracing::warn!(key, error = %e, "Discarding undecodable regenerated value");
                    }
                },
            }
        }

        match self.lookup(key).await {
            Lookup::Hit(value) => return Ok(Some(value)),
            Lookup::Null => return Ok(None),
            Lookup::Miss => {}
        }

        metrics::record_cache_regeneration();
        let value = factory().await?;
        let outcome = match &value {
            Some(value) => match self.encode(key, value) {
                Some(payload) => {
                    if payload != "null" {
                        self.write_value(key, &payload, ttl).await;
                    }
                    Some(Some(payload))
                }
                None => None,
            },
            None => {
                if let Some(null_ttl) = null_ttl {
                    self.write_raw(key, NULL_MARKER, TtlPolicy::RelativeToNow(null_ttl))
                        .await;
                }
                Some(None)
            }
        };
        if let (Some(guard), Some(payload)) = (guard.as_mut(), outcome) {
            **guard = Some(Regenerated(payload));
        }
        Ok(value)
    }

    fn encode<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Option<String> {
        match serde_json::to_string(value) {
            Ok(payload) => Some(payload),
            Err(e) => {
                tracing::warn!(key, error = %e, "Failed to serialize cache value, not storing");
                None
            }
        }
    }

    async fn write_value(&self, key: &str, payload: &str, ttl: Option<TtlPolicy>) -> bool {
        let ttl = ttl.unwrap_or(TtlPolicy::RelativeToNow(self.settings.default_ttl));
        self.write_raw(key, payload, ttl).await
    }

    async fn wait_for_lock<'l>(
        &self,
        lease: &'l KeyLockLease<'_>,
    ) -> Option<MutexGuard<'l, Option<Regenerated>>> {
        let Some(limit) = self.settings.lock_timeout else {
            return Some(lease.lock.lock().await);
        };
        match tokio::time::timeout(limit, lease.lock.lock()).await {
            Ok(guard) => Some(guard),
            Err(_) => {
                tracing::warn!(
                    key = lease.key,
                    timeout_ms = limit.as_millis() as u64,
                    "Timed out waiting for cache regeneration, computing without lock"
                );
                None
            }
        }
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Lookup<T> {
        let raw = match self.store.get_string(key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => {
                metrics::record_cache_lookup("miss");
                return Lookup::Miss;
            }
            Err(e) => {
                self.backend_failed("get", key, &e);
                metrics::record_cache_lookup("miss");
                return Lookup::Miss;
            }
        };

        if raw == NULL_MARKER {
            metrics::record_cache_lookup("null");
            return Lookup::Null;
        }
        match serde_json::from_str(&raw) {
            Ok(value) => {
                metrics::record_cache_lookup("hit");
                Lookup::Hit(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "Discarding undecodable cache payload");
                metrics::record_cache_lookup("miss");
                Lookup::Miss
            }
        }
    }

    async fn write_raw(&self, key: &str, payload: &str, ttl: TtlPolicy) -> bool {
        match self.store.set_string(key, payload, ttl).await {
            Ok(()) => true,
            Err(e) => {
                self.backend_failed("set", key, &e);
                false
            }
        }
    }

    fn backend_failed(&self, operation: &'static str, key: &str, error: &CacheError) {
        metrics::record_cache_error(operation);
        tracing::warn!(
            operation,
            key,
            backend = self.store.name(),
            error = %error,
            "Cache backend operation failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use async_trait::async_trait;
    use std::convert::Infallible;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service() -> (Arc<MemoryCacheStore>, CacheService) {
        let store = Arc::new(MemoryCacheStore::new());
        let service = CacheService::new(store.clone(), CacheSettings::default());
        (store, service)
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get_string(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn set_string(&self, _key: &str, _value: &str, _ttl: TtlPolicy) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn refresh(&self, _key: &str) -> Result<(), CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Backend("connection refused".into()))
        }

        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn test_get_and_set() {
        let (_, cache) = service();
        assert!(cache.set("k", &vec![1, 2, 3], None).await);
        assert_eq!(cache.get::<Vec<i32>>("k").await, Some(vec![1, 2, 3]));
        assert_eq!(cache.get::<Vec<i32>>("missing").await, None);
    }

    #[tokio::test]
    async fn test_set_null_value_is_noop() {
        let (store, cache) = service();
        assert!(!cache.set("k", &Option::<u32>::None, None).await);
        assert!(store.is_empty());
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_get_treats_null_marker_as_absent() {
        let (store, cache) = service();
        store
            .set_string("k", NULL_MARKER, TtlPolicy::None)
            .await
            .unwrap();
        assert_eq!(cache.get::<String>("k").await, None);
        assert!(cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_miss() {
        let (store, cache) = service();
        store
            .set_string("k", "\"text\"", TtlPolicy::None)
            .await
            .unwrap();
        assert_eq!(cache.get::<u64>("k").await, None);
    }

    #[tokio::test]
    async fn test_get_or_set_stores_factory_value() {
        let (_, cache) = service();
        let calls = &AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Some("v".to_string()))
                }, None)
                .await
                .unwrap();
            assert_eq!(value.as_deref(), Some("v"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_or_set_does_not_cache_none() {
        let (store, cache) = service();
        let value: Option<u32> = cache
            .get_or_set("k", || async { Ok::<_, Infallible>(None) }, None)
            .await
            .unwrap();
        assert!(value.is_none());
        assert!(store.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callers_regenerate_once() {
        let (_, cache) = service();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..32 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("hot", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(Some(7u64))
                    }, None)
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.pending_locks(), 0);
    }

    #[tokio::test]
    async fn test_null_protection_short_circuits_factory() {
        let (_, cache) = service();
        let calls = &AtomicUsize::new(0);

        for _ in 0..5 {
            let value: Option<String> = cache
                .get_or_set_with_null_protection("ghost", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(None)
                }, None, Some(Duration::from_secs(60)))
                .await
                .unwrap();
            assert!(value.is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_null_marker_expires() {
        let (_, cache) = service();
        let calls = &AtomicUsize::new(0);
        let null_ttl = Some(Duration::from_millis(20));

        let load = move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<Option<u8>, Infallible>(None)
        };
        cache
            .get_or_set_with_null_protection("ghost", load, None, null_ttl)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        cache
            .get_or_set_with_null_protection("ghost", load, None, null_ttl)
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_factory_error_propagates_and_releases_lock() {
        let (store, cache) = service();
        let result: Result<Option<u8>, &str> = cache
            .get_or_set("k", || async { Err("upstream down") }, None)
            .await;
        assert_eq!(result.unwrap_err(), "upstream down");
        assert!(store.is_empty());
        assert_eq!(cache.pending_locks(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_degrades_to_factory() {
        let cache = CacheService::new(Arc::new(BrokenStore), CacheSettings::default());
        let calls = &AtomicUsize::new(0);

        for _ in 0..2 {
            let value = cache
                .get_or_set("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Infallible>(Some(1u8))
                }, None)
                .await
                .unwrap();
            assert_eq!(value, Some(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(!cache.exists("k").await);
        assert!(!cache.set("k", &1u8, None).await);
        cache.remove("k").await;
        cache.refresh("k").await;
        assert_eq!(cache.remove_by_prefix("idgw:").await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_lock_timeout_computes_without_lock() {
        let store = Arc::new(MemoryCacheStore::new());
        let cache = Arc::new(CacheService::new(
            store,
            CacheSettings {
                lock_timeout: Some(Duration::from_millis(50)),
                ..CacheSettings::default()
            },
        ));

        let slow = {
            let cache = cache.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("k", || async {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        Ok::<_, Infallible>(Some("slow".to_string()))
                    }, None)
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        let started = std::time::Instant::now();
        let fast = cache
            .get_or_set("k", || async { Ok::<_, Infallible>(Some("fast".to_string())) }, None)
            .await
            .unwrap();
        assert_eq!(fast.as_deref(), Some("fast"));
        assert!(started.elapsed() < Duration::from_millis(400));

        assert_eq!(slow.await.unwrap().as_deref(), Some("slow"));
        assert_eq!(cache.pending_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_share_a_none_result() {
        let (store, cache) = service();
        let cache = Arc::new(cache);
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("idgw:user:id:ghost", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<Option<String>, Infallible>(None)
                    }, None)
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert!(handle.await.unwrap().is_none());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(store.is_empty());
        assert_eq!(cache.pending_locks(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_waiters_share_result_when_backend_is_down() {
        let cache = Arc::new(CacheService::new(Arc::new(BrokenStore), CacheSettings::default()));
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_set("k", move || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        Ok::<_, Infallible>(Some(3u8))
                    }, None)
                    .await
                    .unwrap()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), Some(3));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_honours_explicit_policy() {
        let (_, cache) = service();
        cache
            .set("sliding", &1u8, Some(TtlPolicy::Sliding(Duration::from_millis(60))))
            .await;
        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cache.refresh("sliding").await;
        }
        assert_eq!(cache.get::<u8>("sliding").await, Some(1));

        let past = std::time::SystemTime::now() - Duration::from_secs(1);
        cache.set("stale", &1u8, Some(TtlPolicy::Absolute(past))).await;
        assert!(!cache.exists("stale").await);
    }

    #[tokio::test]
    async fn test_remove_by_prefix_on_memory_backend() {
        let (_, cache) = service();
        cache.set("idgw:role:id:1", &"a", None).await;
        cache.set("idgw:role:all", &"b", None).await;
        cache.set("idgw:user:id:1", &"c", None).await;

        assert_eq!(cache.remove_by_prefix("idgw:role:").await, 2);
        assert!(cache.exists("idgw:user:id:1").await);
    }
}
