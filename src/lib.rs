//! Identity gateway: hot-reloadable route configuration and a
//! stampede-safe identity cache.

pub mod admin;
pub mod cache;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod store;

pub use cache::CacheService;
pub use config::schema::GatewayConfig;
pub use lifecycle::{Gateway, Shutdown};
pub use routing::SnapshotProvider;
