//! Process configuration subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → GatewayConfig (validated, immutable)
//!     → handed to lifecycle::startup
//!
//! Store document changes:
//!     watcher.rs detects change
//!     → reload trigger sent over a channel
//!     → routing::SnapshotProvider::reload
//! ```
//!
//! # Design Decisions
//! - Process settings are read once; only route topology hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CacheBackendKind, CacheConfig, GatewayConfig, LogFormat, ObservabilityConfig,
    StoreConfig, WarmupConfig,
};
pub use watcher::StoreWatcher;
