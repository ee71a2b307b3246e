//! Configuration schema definitions.
//!
//! This module defines the process configuration for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Administrative API settings.
    pub admin: AdminConfig,

    /// Where route, cluster and identity rows are read from.
    pub store: StoreConfig,

    /// Cache backend and stampede protection settings.
    pub cache: CacheConfig,

    /// Startup cache warmup.
    pub warmup: WarmupConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Serve the admin API.
    pub enabled: bool,

    /// Bind address (e.g., "127.0.0.1:8081").
    pub bind_address: String,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Upper bound for a single admin request, long-polls included.
    pub request_timeout_secs: u64,
}

/// Placeholder shipped in defaults. Accepted, but startup logs a warning while it is in use.
pub const PLACEHOLDER_API_KEY: &str = "CHANGE_ME_IN_PRODUCTION";

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "127.0.0.1:8081".to_string(),
            api_key: PLACEHOLDER_API_KEY.to_string(),
            request_timeout_secs: 90,
        }
    }
}

/// Store configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON store document.
    pub path: PathBuf,

    /// Reload the snapshot whenever the document changes on disk.
    pub watch: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("gateway-store.json"),
            watch: true,
        }
    }
}

/// Which cache adapter backs the cache service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    #[default]
    Memory,
    Redis,
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub backend: CacheBackendKind,

    /// Connection URL, required for the redis backend.
    pub redis_url: Option<String>,

    /// TTL applied when callers do not pick one.
    pub default_ttl_secs: u64,

    /// Lifetime of a null marker.
    pub null_ttl_secs: u64,

    /// Maximum wait on a per-key regeneration lock. Unset waits forever.
    pub lock_timeout_ms: Option<u64>,

    /// How often the memory backend purges expired entries.
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackendKind::Memory,
            redis_url: None,
            default_ttl_secs: 30 * 60,
            null_ttl_secs: 60,
            lock_timeout_ms: None,
            sweep_interval_secs: 30,
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn null_ttl(&self) -> Duration {
        Duration::from_secs(self.null_ttl_secs)
    }

    pub fn lock_timeout(&self) -> Option<Duration> {
        self.lock_timeout_ms.map(Duration::from_millis)
    }
}

/// Cache warmup configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WarmupConfig {
    pub enabled: bool,

    /// Delay after startup before warming, in seconds.
    pub delay_secs: u64,

    /// TTL of warmed entries, in seconds.
    pub ttl_secs: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            delay_secs: 5,
            ttl_secs: 60 * 60,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
