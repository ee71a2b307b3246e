//! Storage contracts for route topology and identity data.
//!
//! # Data Flow
//! ```text
//! persisted rows (file document, database, memory)
//!     → RouteStore::load_topology    (enabled rows, one read)
//!     → routing::translator          (typed descriptors)
//!
//!     → IdentityStore::list_*        (hot read data)
//!     → cache::warmup                (pre-populated cache keys)
//! ```
//!
//! # Design Decisions
//! - Filtering disabled rows is the store's job; consumers never re-check
//! - Stores hand out owned rows; no borrowed views across await points
//! - One error type for every backend, so the reload path stays generic

pub mod file;
pub mod memory;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use models::{
    IpRule, IpRuleKind, IpRuleSet, Permission, RateLimitPolicy, RawClusterRow, RawRouteRow,
    Role, StoreDocument, SystemConfigEntry,
};

/// Errors raised while reading from a store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is malformed: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Enabled route and cluster rows taken from the same version of the store.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    pub routes: Vec<RawRouteRow>,
    pub clusters: Vec<RawClusterRow>,
}

/// Source of route and cluster rows.
#[async_trait]
pub trait RouteStore: Send + Sync {
    /// Routes currently flagged enabled.
    async fn list_enabled_routes(&self) -> Result<Vec<RawRouteRow>, StoreError>;

    /// Clusters currently flagged enabled.
    async fn list_enabled_clusters(&self) -> Result<Vec<RawClusterRow>, StoreError>;

    /// Both row sets for one reload. Stores that can read them together
    /// override this so a concurrent edit never mixes two versions.
    async fn load_topology(&self) -> Result<Topology, StoreError> {
        let routes = self.list_enabled_routes().await?;
        let clusters = self.list_enabled_clusters().await?;
        Ok(Topology { routes, clusters })
    }
}

/// Source of identity data served from the cache.
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn list_system_configs(&self) -> Result<Vec<SystemConfigEntry>, StoreError>;

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError>;

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError>;

    async fn list_rate_limit_policies(&self) -> Result<Vec<RateLimitPolicy>, StoreError>;

    /// Active, unexpired rules of one kind.
    async fn list_active_ip_rules(&self, kind: IpRuleKind) -> Result<Vec<IpRule>, StoreError>;
}
