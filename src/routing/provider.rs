//! Publishes the current configuration snapshot.
//!
//! # Responsibilities
//! - Serve the current snapshot without locking
//! - Rebuild and publish a snapshot on demand
//! - Fire the superseded snapshot's signal after each publish
//!
//! # Design Decisions
//! - `ArcSwap` holds the published snapshot; readers never take a lock
//! - Reloads serialize on an async mutex so each swap fires exactly one
//!   signal, and the version sequence has no gaps
//! - The old signal fires only after the swap, so a woken observer that
//!   calls `current()` always sees the replacement
//! - A failed fetch leaves the current snapshot and its signal untouched

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::observability::metrics::{self, Outcome};
use crate::routing::snapshot::{ChangeToken, ConfigSnapshot};
use crate::routing::translator::ConfigTranslator;
use crate::store::{RouteStore, StoreError};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to fetch route topology: {0}")]
    Fetch(#[source] StoreError),
}

/// Summary of a successful reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub version: u64,
    pub routes: usize,
    pub clusters: usize,
    /// Rows that failed conversion plus routes dropped while linking.
    pub dropped_routes: usize,
    pub dropped_clusters: usize,
    pub elapsed: Duration,
}

pub struct SnapshotProvider {
    current: ArcSwap<ConfigSnapshot>,
    store: Arc<dyn RouteStore>,
    translator: ConfigTranslator,
    reload_lock: Mutex<()>,
}

impl std::fmt::Debug for SnapshotProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotProvider")
            .field("version", &self.current.load().version())
            .finish_non_exhaustive()
    }
}

impl SnapshotProvider {
    /// Start with an empty snapshot; nothing is fetched until `reload`.
    pub fn new(store: Arc<dyn RouteStore>, translator: ConfigTranslator) -> Self {
        Self {
            current: ArcSwap::from_pointee(ConfigSnapshot::empty()),
            store,
            translator,
            reload_lock: Mutex::new(()),
        }
    }

    /// The currently published snapshot.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.current.load_full()
    }

    /// Observe the current snapshot being superseded.
    pub fn change_token(&self) -> ChangeToken {
        self.current.load().change_token()
    }

    /// Fetch rows, build a snapshot and publish it.
    pub async fn reload(&self) -> Result<ReloadOutcome, ReloadError> {
        let _guard = self.reload_lock.lock().await;
        let started = Instant::now();

        let result = self.fetch_and_publish(started).await;
        match &result {
            Ok(outcome) => {
                metrics::record_reload(Outcome::Success, outcome.elapsed);
                metrics::record_snapshot(outcome.version, outcome.routes, outcome.clusters);
                tracing::info!(
                    version = outcome.version,
                    routes = outcome.routes,
                    clusters = outcome.clusters,
                    dropped_routes = outcome.dropped_routes,
                    dropped_clusters = outcome.dropped_clusters,
                    elapsed_ms = outcome.elapsed.as_millis() as u64,
                    "Configuration snapshot published"
                );
            }
            Err(e) => {
                metrics::record_reload(Outcome::Failure, started.elapsed());
                tracing::error!(
                    error = %e,
                    version = self.current.load().version(),
                    "Configuration reload failed, keeping current snapshot"
                );
            }
        }
        result
    }

    async fn fetch_and_publish(&self, started: Instant) -> Result<ReloadOutcome, ReloadError> {
        let topology = self
            .store
            .load_topology()
            .await
            .map_err(ReloadError::Fetch)?;

        let translated = self
            .translator
            .translate(&topology.routes, &topology.clusters);
        let version = self.current.load().version() + 1;
        let (snapshot, report) =
            ConfigSnapshot::build(version, translated.routes, translated.clusters);

        let outcome = ReloadOutcome {
            version,
            routes: snapshot.routes().len(),
            clusters: snapshot.clusters().len(),
            dropped_routes: translated.skipped_routes + report.dropped_routes(),
            dropped_clusters: translated.skipped_clusters + report.duplicate_clusters.len(),
            elapsed: started.elapsed(),
        };

        let previous = self.current.swap(Arc::new(snapshot));
        previous.signal().fire();
        Ok(outcome)
    }
}
