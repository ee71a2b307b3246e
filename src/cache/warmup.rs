//! Background cache preloading.
//!
//! # Responsibilities
//! - Wait out a startup delay, then load hot identity data into the cache
//! - Warm each category independently; one failure never stops the rest
//! - Report what was written per category
//!
//! # Data Flow
//! ```text
//! startup → spawn(shutdown)
//!     → sleep(delay) (abandoned on shutdown)
//!     → system config → roles → permissions → rate limits → IP rules
//!     → WarmupReport
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::cache::keys;
use crate::cache::service::CacheService;
use crate::cache::store::TtlPolicy;
use crate::config::WarmupConfig;
use crate::observability::metrics::{self, Outcome};
use crate::store::{IdentityStore, IpRuleKind, IpRuleSet, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarmupCategory {
    SystemConfig,
    Roles,
    Permissions,
    RateLimitPolicies,
    IpRules,
}

impl WarmupCategory {
    /// Warming order.
    pub const ALL: [WarmupCategory; 5] = [
        WarmupCategory::SystemConfig,
        WarmupCategory::Roles,
        WarmupCategory::Permissions,
        WarmupCategory::RateLimitPolicies,
        WarmupCategory::IpRules,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WarmupCategory::SystemConfig => "system_config",
            WarmupCategory::Roles => "roles",
            WarmupCategory::Permissions => "permissions",
            WarmupCategory::RateLimitPolicies => "rate_limit_policies",
            WarmupCategory::IpRules => "ip_rules",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryReport {
    pub category: WarmupCategory,
    /// Entries written, or the error that stopped this category.
    pub result: Result<usize, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    pub categories: Vec<CategoryReport>,
    pub elapsed: Duration,
}

impl WarmupReport {
    pub fn entries_written(&self) -> usize {
        self.categories
            .iter()
            .filter_map(|c| c.result.as_ref().ok())
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = WarmupCategory> + '_ {
        self.categories
            .iter()
            .filter(|c| c.result.is_err())
            .map(|c| c.category)
    }

    pub fn get(&self, category: WarmupCategory) -> Option<&CategoryReport> {
        self.categories.iter().find(|c| c.category == category)
    }
}

pub struct CacheWarmup {
    cache: Arc<CacheService>,
    store: Arc<dyn IdentityStore>,
    delay: Duration,
    ttl: Duration,
}

impl CacheWarmup {
    pub fn new(cache: Arc<CacheService>, store: Arc<dyn IdentityStore>, config: &WarmupConfig) -> Self {
        Self {
            cache,
            store,
            delay: Duration::from_secs(config.delay_secs),
            ttl: Duration::from_secs(config.ttl_secs),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Run in the background. The task yields `None` if shutdown arrived
    /// before warming began.
    pub fn spawn(self, shutdown: broadcast::Receiver<()>) -> JoinHandle<Option<WarmupReport>> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Option<WarmupReport> {
        tokio::select! {
            _ = tokio::time::sleep(self.delay) => {}
            _ = shutdown.recv() => {
                tracing::info!("Shutdown before cache warmup started, skipping");
                return None;
            }
        }
        Some(self.warm_all().await)
    }

    /// Warm every category now, in order.
    pub async fn warm_all(&self) -> WarmupReport {
        let started = Instant::now();
        tracing::info!(backend = self.cache.backend_name(), "Cache warmup starting");

        let mut categories = Vec::with_capacity(WarmupCategory::ALL.len());
        for category in WarmupCategory::ALL {
            let result = self.warm(category).await;
            match &result {
                Ok(entries) => {
                    metrics::record_warmup(category.as_str(), Outcome::Success);
                    tracing::debug!(category = category.as_str(), entries, "Warmed cache category");
                }
                Err(e) => {
                    metrics::record_warmup(category.as_str(), Outcome::Failure);
                    tracing::error!(
                        category = category.as_str(),
                        error = %e,
                        "Cache warmup failed for category, continuing"
                    );
                }
            }
            categories.push(CategoryReport {
                category,
                result: result.map_err(|e| e.to_string()),
            });
        }

        let report = WarmupReport {
            categories,
            elapsed: started.elapsed(),
        };
        tracing::info!(
            entries = report.entries_written(),
            failed = report.failed().count(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Cache warmup finished"
        );
        report
    }

    async fn warm(&self, category: WarmupCategory) -> Result<usize, StoreError> {
        match category {
            WarmupCategory::SystemConfig => self.warm_system_config().await,
            WarmupCategory::Roles => self.warm_roles().await,
            WarmupCategory::Permissions => self.warm_permissions().await,
            WarmupCategory::RateLimitPolicies => self.warm_rate_limit_policies().await,
            WarmupCategory::IpRules => self.warm_ip_rules().await,
        }
    }

    async fn warm_system_config(&self) -> Result<usize, StoreError> {
        let entries = self.store.list_system_configs().await?;
        let mut written = 0;
        for entry in &entries {
            written += self
                .put(&keys::system_config(&entry.group, &entry.key), entry)
                .await;
        }
        written += self.put(&keys::all_system_configs(), &entries).await;
        Ok(written)
    }

    async fn warm_roles(&self) -> Result<usize, StoreError> {
        let roles = self.store.list_roles().await?;
        let mut written = 0;
        for role in &roles {
            written += self.put(&keys::role_by_id(&role.id), role).await;
            written += self.put(&keys::role_by_name(&role.name), role).await;
        }
        written += self.put(&keys::all_roles(), &roles).await;
        Ok(written)
    }

    async fn warm_permissions(&self) -> Result<usize, StoreError> {
        let permissions = self.store.list_permissions().await?;
        Ok(self.put(&keys::all_permissions(), &permissions).await)
    }

    async fn warm_rate_limit_policies(&self) -> Result<usize, StoreError> {
        let policies = self.store.list_rate_limit_policies().await?;
        let mut written = 0;
        for policy in &policies {
            written += self.put(&keys::rate_limit_policy(&policy.name), policy).await;
        }
        written += self.put(&keys::all_rate_limit_policies(), &policies).await;
        Ok(written)
    }

    async fn warm_ip_rules(&self) -> Result<usize, StoreError> {
        let rules = IpRuleSet {
            blacklist: self.store.list_active_ip_rules(IpRuleKind::Blacklist).await?,
            whitelist: self.store.list_active_ip_rules(IpRuleKind::Whitelist).await?,
        };
        Ok(self.put(&keys::active_ip_rules(), &rules).await)
    }

    /// Returns 1 if the backend accepted the entry, 0 otherwise.
    async fn put<T: serde::Serialize + ?Sized>(&self, key: &str, value: &T) -> usize {
        let stored = self
            .cache
            .set(key, value, Some(TtlPolicy::RelativeToNow(self.ttl)))
            .await;
        usize::from(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::service::CacheSettings;
    use crate::cache::store::{CacheError, CacheStore};
    use crate::store::{
        IpRule, MemoryStore, Permission, RateLimitPolicy, Role, StoreDocument, SystemConfigEntry,
    };
    use async_trait::async_trait;

    fn document() -> StoreDocument {
        StoreDocument {
            system_configs: vec![SystemConfigEntry {
                group: "Jwt".into(),
                key: "Issuer".into(),
                value: "https://id.example.com".into(),
            }],
            roles: vec![Role {
                id: "1".into(),
                name: "Admin".into(),
                description: None,
                is_system: true,
            }],
            permissions: vec![Permission {
                id: "p1".into(),
                code: "users.read".into(),
                name: "Read users".into(),
                resource: Some("users".into()),
                action: Some("read".into()),
            }],
            rate_limit_policies: vec![RateLimitPolicy {
                id: "r1".into(),
                name: "burst".into(),
                permit_limit: 100,
                window_secs: 60,
                queue_limit: 0,
                is_enabled: true,
            }],
            ip_rules: vec![IpRule {
                id: "ip1".into(),
                address: "10.0.0.0/8".into(),
                kind: IpRuleKind::Whitelist,
                reason: None,
                is_active: true,
                expires_at: None,
            }],
            ..Default::default()
        }
    }

    fn cache() -> Arc<CacheService> {
        Arc::new(CacheService::new(
            Arc::new(MemoryCacheStore::new()),
            CacheSettings::default(),
        ))
    }

    fn warmup(cache: Arc<CacheService>, store: Arc<dyn IdentityStore>) -> CacheWarmup {
        CacheWarmup::new(cache, store, &WarmupConfig::default()).with_delay(Duration::ZERO)
    }

    /// Fails role listing, delegates everything else.
    struct RolesDown(MemoryStore);

    #[async_trait]
    impl IdentityStore for RolesDown {
        async fn list_system_configs(&self) -> Result<Vec<SystemConfigEntry>, StoreError> {
            self.0.list_system_configs().await
        }

        async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
            Err(StoreError::Unavailable("roles table locked".into()))
        }

        async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
            self.0.list_permissions().await
        }

        async fn list_rate_limit_policies(&self) -> Result<Vec<RateLimitPolicy>, StoreError> {
            self.0.list_rate_limit_policies().await
        }

        async fn list_active_ip_rules(&self, kind: IpRuleKind) -> Result<Vec<IpRule>, StoreError> {
            self.0.list_active_ip_rules(kind).await
        }
    }

    /// Reads miss and writes are refused, as with an unreachable Redis.
    struct RejectingCache;

    #[async_trait]
    impl CacheStore for RejectingCache {
        async fn get_string(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Ok(None)
        }

        async fn set_string(&self, _key: &str, _value: &str, _ttl: TtlPolicy) -> Result<(), CacheError> {
            Err(CacheError::Backend("read-only replica".into()))
        }

        async fn remove(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }

        async fn refresh(&self, _key: &str) -> Result<(), CacheError> {
            Ok(())
        }

        async fn exists(&self, _key: &str) -> Result<bool, CacheError> {
            Ok(false)
        }

        fn name(&self) -> &'static str {
            "rejecting"
        }
    }

    #[tokio::test]
    async fn test_warms_every_category() {
        let cache = cache();
        let store = Arc::new(MemoryStore::with_document(document()));
        let report = warmup(cache.clone(), store).warm_all().await;

        assert_eq!(report.categories.len(), 5);
        assert_eq!(report.failed().count(), 0);
        assert_eq!(report.entries_written(), 9);
        assert_eq!(report.get(WarmupCategory::Roles).unwrap().result, Ok(3));

        let role: Option<Role> = cache.get(&keys::role_by_name("ADMIN")).await;
        assert_eq!(role.map(|r| r.id), Some("1".to_string()));
        assert!(cache.exists(&keys::role_by_id("1")).await);
        assert!(cache.exists(&keys::all_roles()).await);
        assert!(cache.exists(&keys::system_config("Jwt", "Issuer")).await);
        assert!(cache.exists(&keys::all_system_configs()).await);
        assert!(cache.exists(&keys::all_permissions()).await);
        assert!(cache.exists(&keys::rate_limit_policy("burst")).await);

        let rules: Option<IpRuleSet> = cache.get(&keys::active_ip_rules()).await;
        let rules = rules.unwrap();
        assert_eq!(rules.whitelist.len(), 1);
        assert!(rules.blacklist.is_empty());
    }

    #[tokio::test]
    async fn test_failing_category_does_not_stop_others() {
        let cache = cache();
        let store = Arc::new(RolesDown(MemoryStore::with_document(document())));
        let report = warmup(cache.clone(), store).warm_all().await;

        let failed: Vec<_> = report.failed().collect();
        assert_eq!(failed, [WarmupCategory::Roles]);
        assert!(report
            .get(WarmupCategory::Roles)
            .unwrap()
            .result
            .as_ref()
            .unwrap_err()
            .contains("roles table locked"));

        assert!(!cache.exists(&keys::all_roles()).await);
        assert!(cache.exists(&keys::all_permissions()).await);
        assert!(cache.exists(&keys::active_ip_rules()).await);
    }

    #[tokio::test]
    async fn test_rejected_writes_are_not_counted() {
        let cache = Arc::new(CacheService::new(
            Arc::new(RejectingCache),
            CacheSettings::default(),
        ));
        let store = Arc::new(MemoryStore::with_document(document()));
        let report = warmup(cache, store).warm_all().await;

        assert_eq!(report.failed().count(), 0);
        assert_eq!(report.entries_written(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_delay_skips_warmup() {
        let cache = cache();
        let store = Arc::new(MemoryStore::with_document(document()));
        let (tx, rx) = broadcast::channel(1);

        let handle = warmup(cache.clone(), store)
            .with_delay(Duration::from_secs(3600))
            .spawn(rx);
        tx.send(()).unwrap();

        assert!(handle.await.unwrap().is_none());
        assert!(!cache.exists(&keys::all_roles()).await);
    }
}
