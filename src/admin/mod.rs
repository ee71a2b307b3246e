//! Administrative HTTP API.
//!
//! # Responsibilities
//! - Expose snapshot state, manual reload and change long-polling
//! - Expose cache inspection and eviction
//! - Require a bearer token on every route
//!
//! # Routes
//! ```text
//! GET    /admin/status
//! GET    /admin/config
//! POST   /admin/config/reload
//! GET    /admin/config/watch?since=<version>&timeout_secs=<n>
//! GET    /admin/cache/{key}
//! DELETE /admin/cache/{key}
//! DELETE /admin/cache?prefix=<p>
//! ```

pub mod auth;
pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::cache::CacheService;
use crate::routing::SnapshotProvider;

use self::auth::admin_auth_middleware;
use self::handlers::*;

/// Shared handles injected into admin handlers.
#[derive(Clone)]
pub struct AdminState {
    pub provider: Arc<SnapshotProvider>,
    pub cache: Arc<CacheService>,
    pub api_key: Arc<str>,
}

impl AdminState {
    pub fn new(provider: Arc<SnapshotProvider>, cache: Arc<CacheService>, api_key: &str) -> Self {
        Self {
            provider,
            cache,
            api_key: Arc::from(api_key),
        }
    }
}

#[allow(deprecated)]
pub fn setup_admin_router(state: AdminState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/config", get(get_config))
        .route("/admin/config/reload", post(reload_config))
        .route("/admin/config/watch", get(watch_config))
        .route("/admin/cache", axum::routing::delete(evict_cache_prefix))
        .route("/admin/cache/{key}", get(get_cache_entry).delete(evict_cache_entry))
        .layer(middleware::from_fn_with_state(state.clone(), admin_auth_middleware))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}
