//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (TTLs > 0, addresses parse)
//! - Check cross-field requirements (redis backend needs a URL)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: GatewayConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{CacheBackendKind, GatewayConfig};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: '{value}' is not a valid socket address")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    ZeroValue { field: &'static str },

    #[error("cache.null_ttl_secs ({null_ttl}) must not exceed cache.default_ttl_secs ({default_ttl})")]
    NullTtlTooLong { null_ttl: u64, default_ttl: u64 },

    #[error("cache.redis_url is required when cache.backend = \"redis\"")]
    MissingRedisUrl,

    #[error("admin.api_key must not be empty when the admin API is enabled")]
    EmptyApiKey,

    #[error("observability.log_level: unknown level '{0}'")]
    UnknownLogLevel(String),

    #[error("store.path must not be empty")]
    EmptyStorePath,
}

pub fn validate_config(config: &GatewayConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.admin.enabled {
        check_address("admin.bind_address", &config.admin.bind_address, &mut errors);
        if config.admin.api_key.trim().is_empty() {
            errors.push(ValidationError::EmptyApiKey);
        }
        if config.admin.request_timeout_secs == 0 {
            errors.push(ValidationError::ZeroValue {
                field: "admin.request_timeout_secs",
            });
        }
    }

    if config.store.path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyStorePath);
    }

    let cache = &config.cache;
    for (field, value) in [
        ("cache.default_ttl_secs", cache.default_ttl_secs),
        ("cache.null_ttl_secs", cache.null_ttl_secs),
        ("cache.sweep_interval_secs", cache.sweep_interval_secs),
        ("warmup.ttl_secs", config.warmup.ttl_secs),
    ] {
        if value == 0 {
            errors.push(ValidationError::ZeroValue { field });
        }
    }
    if cache.lock_timeout_ms == Some(0) {
        errors.push(ValidationError::ZeroValue {
            field: "cache.lock_timeout_ms",
        });
    }
    if cache.null_ttl_secs > cache.default_ttl_secs && cache.default_ttl_secs > 0 {
        errors.push(ValidationError::NullTtlTooLong {
            null_ttl: cache.null_ttl_secs,
            default_ttl: cache.default_ttl_secs,
        });
    }
    if cache.backend == CacheBackendKind::Redis
        && cache.redis_url.as_deref().map_or(true, |u| u.trim().is_empty())
    {
        errors.push(ValidationError::MissingRedisUrl);
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_lowercase().as_str()) {
        errors.push(ValidationError::UnknownLogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled {
        check_address(
            "observability.metrics_address",
            &observability.metrics_address,
            &mut errors,
        );
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(field: &'static str, value: &str, errors: &mut Vec<ValidationError>) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = GatewayConfig::default();
        assert_eq!(config.admin.api_key, crate::config::schema::PLACEHOLDER_API_KEY);
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn test_collects_every_error() {
        let mut config = GatewayConfig::default();
        config.admin.api_key = "  ".into();
        config.cache.default_ttl_secs = 0;
        config.cache.backend = CacheBackendKind::Redis;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::EmptyApiKey));
        assert!(errors.contains(&ValidationError::ZeroValue {
            field: "cache.default_ttl_secs"
        }));
        assert!(errors.contains(&ValidationError::MissingRedisUrl));
        assert!(errors.contains(&ValidationError::UnknownLogLevel("loud".into())));
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_null_ttl_bounded_by_default_ttl() {
        let mut config = GatewayConfig::default();
        config.cache.default_ttl_secs = 30;
        config.cache.null_ttl_secs = 60;
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::NullTtlTooLong {
                null_ttl: 60,
                default_ttl: 30
            }])
        );
    }

    #[test]
    fn test_disabled_admin_skips_admin_checks() {
        let mut config = GatewayConfig::default();
        config.admin.enabled = false;
        config.admin.bind_address = "garbage".into();
        config.admin.api_key.clear();
        assert!(validate_config(&config).is_ok());
    }
}
