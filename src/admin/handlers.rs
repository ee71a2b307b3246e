use std::collections::BTreeMap;
use std::time::{Duration, UNIX_EPOCH};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::admin::AdminState;
use crate::routing::{ClusterDescriptor, ReloadOutcome, RouteDescriptor};

/// Longest a watch request may hold the connection.
pub const MAX_WATCH_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_WATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
pub struct SystemStatus {
    pub version: &'static str,
    pub status: &'static str,
    pub snapshot_version: u64,
    pub routes: usize,
    pub clusters: usize,
    pub cache_backend: &'static str,
}

#[derive(Serialize)]
pub struct SnapshotView<'a> {
    pub version: u64,
    /// Unix seconds.
    pub loaded_at: u64,
    pub routes: &'a [RouteDescriptor],
    pub clusters: &'a [ClusterDescriptor],
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReloadResponse {
    pub version: u64,
    pub routes: usize,
    pub clusters: usize,
    pub dropped_routes: usize,
    pub dropped_clusters: usize,
    pub elapsed_ms: u64,
}

impl From<ReloadOutcome> for ReloadResponse {
    fn from(outcome: ReloadOutcome) -> Self {
        Self {
            version: outcome.version,
            routes: outcome.routes,
            clusters: outcome.clusters,
            dropped_routes: outcome.dropped_routes,
            dropped_clusters: outcome.dropped_clusters,
            elapsed_ms: outcome.elapsed.as_millis() as u64,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct WatchQuery {
    /// Version the caller already has; a different current version returns
    /// immediately.
    pub since: Option<u64>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchResponse {
    pub version: u64,
    pub changed: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheEntryStatus {
    pub key: String,
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct EvictPrefixQuery {
    pub prefix: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = BTreeMap::from([("error", message.into())]);
    (status, Json(body)).into_response()
}

pub async fn get_status(State(state): State<AdminState>) -> Json<SystemStatus> {
    let snapshot = state.provider.current();
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION"),
        status: "operational",
        snapshot_version: snapshot.version(),
        routes: snapshot.routes().len(),
        clusters: snapshot.clusters().len(),
        cache_backend: state.cache.backend_name(),
    })
}

pub async fn get_config(State(state): State<AdminState>) -> Response {
    let snapshot = state.provider.current();
    let loaded_at = snapshot
        .loaded_at()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    Json(SnapshotView {
        version: snapshot.version(),
        loaded_at,
        routes: snapshot.routes(),
        clusters: snapshot.clusters(),
    })
    .into_response()
}

pub async fn reload_config(State(state): State<AdminState>) -> Response {
    tracing::info!("Configuration reload requested via admin API");
    match state.provider.reload().await {
        Ok(outcome) => Json(ReloadResponse::from(outcome)).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, e.to_string()),
    }
}

pub async fn watch_config(
    State(state): State<AdminState>,
    Query(query): Query<WatchQuery>,
) -> Json<WatchResponse> {
    let snapshot = state.provider.current();
    let baseline = query.since.unwrap_or(snapshot.version());
    if snapshot.version() != baseline {
        return Json(WatchResponse {
            version: snapshot.version(),
            changed: true,
        });
    }

    let wait = query
        .timeout_secs
        .map(Duration::from_secs)
        .unwrap_or(DEFAULT_WATCH_TIMEOUT)
        .min(MAX_WATCH_TIMEOUT);
    let mut token = snapshot.change_token();
    drop(snapshot);
    let _ = tokio::time::timeout(wait, token.changed()).await;

    let version = state.provider.current().version();
    Json(WatchResponse {
        version,
        changed: version != baseline,
    })
}

pub async fn get_cache_entry(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> Json<CacheEntryStatus> {
    let exists = state.cache.exists(&key).await;
    Json(CacheEntryStatus { key, exists })
}

pub async fn evict_cache_entry(
    State(state): State<AdminState>,
    Path(key): Path<String>,
) -> StatusCode {
    state.cache.remove(&key).await;
    tracing::info!(key = %key, "Cache entry evicted via admin API");
    StatusCode::NO_CONTENT
}

pub async fn evict_cache_prefix(
    State(state): State<AdminState>,
    Query(query): Query<EvictPrefixQuery>,
) -> Response {
    if query.prefix.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "prefix must not be empty");
    }
    let removed = state.cache.remove_by_prefix(&query.prefix).await;
    tracing::info!(prefix = %query.prefix, removed, "Cache prefix evicted via admin API");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "prefix": query.prefix, "removed": removed })),
    )
        .into_response()
}
