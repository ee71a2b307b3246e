//! Identity data cache.
//!
//! # Data Flow
//! ```text
//! callers → service.rs (typed get/set, stampede lock, null marker)
//!             → store.rs CacheStore
//!                 → memory.rs (dashmap, in-process)
//!                 → redis.rs  (feature "redis", shared across instances)
//!
//! warmup.rs → IdentityStore → service.rs (once, after a startup delay)
//! ```
//!
//! # Design Decisions
//! - The service only sees `Arc<dyn CacheStore>`; the backend is chosen
//!   from configuration at startup
//! - All keys are built by `keys.rs` so eviction prefixes stay in sync

pub mod keys;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod service;
pub mod store;
pub mod warmup;

pub use memory::MemoryCacheStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisCacheStore;
pub use service::{CacheService, CacheSettings, NULL_MARKER};
pub use store::{CacheError, CacheStore, TtlPolicy};
pub use warmup::{CacheWarmup, WarmupCategory, WarmupReport};
