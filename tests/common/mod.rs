//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use identity_gateway::admin::AdminState;
use identity_gateway::cache::{CacheService, CacheSettings, MemoryCacheStore};
use identity_gateway::routing::{ConfigTranslator, SnapshotProvider};
use identity_gateway::store::{MemoryStore, RawClusterRow, RawRouteRow};

pub const API_KEY: &str = "test-admin-key";

pub fn route_row(route_id: &str, cluster_id: &str, order: i32) -> RawRouteRow {
    RawRouteRow {
        route_id: route_id.into(),
        cluster_id: cluster_id.into(),
        match_path: format!("/{route_id}/{{**catch-all}}"),
        match_methods: Some("GET,POST".into()),
        order,
        is_enabled: true,
        ..Default::default()
    }
}

pub fn cluster_row(cluster_id: &str, port: u16) -> RawClusterRow {
    RawClusterRow {
        cluster_id: cluster_id.into(),
        load_balancing_policy: Some("RoundRobin".into()),
        destinations: Some(format!(
            r#"[{{"Id":"d1","Address":"http://10.0.0.1:{port}"}}]"#
        )),
        is_enabled: true,
        ..Default::default()
    }
}

/// A store with `clusters` clusters and one route per cluster.
pub fn seeded_store(clusters: usize) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for i in 0..clusters {
        let cluster_id = format!("cluster-{i}");
        store.upsert_cluster(cluster_row(&cluster_id, 8000 + i as u16));
        store.upsert_route(route_row(&format!("route-{i}"), &cluster_id, i as i32));
    }
    store
}

pub fn provider(store: Arc<MemoryStore>) -> Arc<SnapshotProvider> {
    Arc::new(SnapshotProvider::new(store, ConfigTranslator::new()))
}

pub fn memory_cache() -> Arc<CacheService> {
    Arc::new(CacheService::new(
        Arc::new(MemoryCacheStore::new()),
        CacheSettings::default(),
    ))
}

pub fn admin_state(provider: Arc<SnapshotProvider>, cache: Arc<CacheService>) -> AdminState {
    AdminState::new(provider, cache, API_KEY)
}
