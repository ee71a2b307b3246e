//! In-process store.
//!
//! Holds a [`StoreDocument`] behind a lock and exposes the mutations an
//! admin surface would make (upsert, remove, enable/disable). Used by tests
//! and by embedders that keep topology in memory.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use super::models::StoreDocument;
use super::{
    IdentityStore, IpRule, IpRuleKind, Permission, RateLimitPolicy, RawClusterRow, RawRouteRow,
    Role, RouteStore, StoreError, SystemConfigEntry, Topology,
};

#[derive(Debug, Default)]
pub struct MemoryStore {
    document: RwLock<StoreDocument>,
    /// When set, every read fails as if the backend were unreachable.
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: StoreDocument) -> Self {
        Self {
            document: RwLock::new(document),
            unavailable: AtomicBool::new(false),
        }
    }

    /// Simulate an outage (or recovery) of the backing store.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Insert a route, replacing any row with the same `route_id`.
    pub fn upsert_route(&self, row: RawRouteRow) {
        self.write(|doc| {
            doc.routes.retain(|r| r.route_id != row.route_id);
            doc.routes.push(row);
        });
    }

    /// Insert a cluster, replacing any row with the same `cluster_id`.
    pub fn upsert_cluster(&self, row: RawClusterRow) {
        self.write(|doc| {
            doc.clusters.retain(|c| c.cluster_id != row.cluster_id);
            doc.clusters.push(row);
        });
    }

    pub fn remove_route(&self, route_id: &str) -> bool {
        self.write(|doc| {
            let before = doc.routes.len();
            doc.routes.retain(|r| r.route_id != route_id);
            doc.routes.len() != before
        })
    }

    pub fn remove_cluster(&self, cluster_id: &str) -> bool {
        self.write(|doc| {
            let before = doc.clusters.len();
            doc.clusters.retain(|c| c.cluster_id != cluster_id);
            doc.clusters.len() != before
        })
    }

    /// Flip the enabled flag of a route. Returns false if no such route.
    pub fn set_route_enabled(&self, route_id: &str, enabled: bool) -> bool {
        self.write(|doc| match doc.routes.iter_mut().find(|r| r.route_id == route_id) {
            Some(route) => {
                route.is_enabled = enabled;
                true
            }
            None => false,
        })
    }

    /// Replace the whole document.
    pub fn replace(&self, document: StoreDocument) {
        self.write(|doc| *doc = document);
    }

    fn write<R>(&self, f: impl FnOnce(&mut StoreDocument) -> R) -> R {
        let mut guard = self
            .document
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    fn read<R>(&self, f: impl FnOnce(&StoreDocument) -> R) -> Result<R, StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store marked unavailable".into()));
        }
        let guard = self
            .document
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(f(&guard))
    }
}

#[async_trait]
impl RouteStore for MemoryStore {
    async fn list_enabled_routes(&self) -> Result<Vec<RawRouteRow>, StoreError> {
        self.read(StoreDocument::enabled_routes)
    }

    async fn list_enabled_clusters(&self) -> Result<Vec<RawClusterRow>, StoreError> {
        self.read(StoreDocument::enabled_clusters)
    }

    async fn load_topology(&self) -> Result<Topology, StoreError> {
        self.read(|doc| Topology {
            routes: doc.enabled_routes(),
            clusters: doc.enabled_clusters(),
        })
    }
}

#[async_trait]
impl IdentityStore for MemoryStore {
    async fn list_system_configs(&self) -> Result<Vec<SystemConfigEntry>, StoreError> {
        self.read(|doc| doc.system_configs.clone())
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        self.read(|doc| doc.roles.clone())
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        self.read(|doc| doc.permissions.clone())
    }

    async fn list_rate_limit_policies(&self) -> Result<Vec<RateLimitPolicy>, StoreError> {
        self.read(|doc| doc.rate_limit_policies.clone())
    }

    async fn list_active_ip_rules(&self, kind: IpRuleKind) -> Result<Vec<IpRule>, StoreError> {
        self.read(|doc| doc.effective_ip_rules(kind))
    }
}
