//! Immutable configuration snapshots and their change signals.
//!
//! # Responsibilities
//! - Bundle routes and clusters that were loaded together
//! - Link routes to clusters, dropping dangling and duplicate entries
//! - Carry a one-shot signal that fires when the snapshot is superseded
//!
//! # Design Decisions
//! - A snapshot is never mutated after construction; readers keep an
//!   `Arc<ConfigSnapshot>` for as long as they need a consistent view
//! - The change signal is a `watch` channel that only ever goes
//!   `false → true`, so late subscribers still observe a fired signal and
//!   any number of observers can wait without coordination

use std::collections::HashSet;
use std::time::SystemTime;

use tokio::sync::watch;

use crate::routing::descriptor::{sort_routes, ClusterDescriptor, RouteDescriptor};

/// One-shot broadcast fired when a snapshot stops being current.
#[derive(Debug)]
pub struct ChangeSignal {
    tx: watch::Sender<bool>,
}

impl ChangeSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx }
    }

    /// Fire the signal. Returns true only for the first call.
    pub fn fire(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// A new observation handle.
    pub fn token(&self) -> ChangeToken {
        ChangeToken {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for ChangeSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Observation handle on a [`ChangeSignal`].
///
/// Dropping a token, or a pending `changed()` future, only ends this
/// observer's wait.
#[derive(Debug, Clone)]
pub struct ChangeToken {
    rx: watch::Receiver<bool>,
}

impl ChangeToken {
    /// Whether the signal has already fired.
    pub fn has_changed(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once the signal fires; immediately if it already has.
    pub async fn changed(&mut self) {
        // The sender lives inside the snapshot; if the snapshot is gone the
        // wait is over either way.
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

/// An immutable, versioned set of routes and clusters.
#[derive(Debug)]
pub struct ConfigSnapshot {
    version: u64,
    loaded_at: SystemTime,
    routes: Vec<RouteDescriptor>,
    clusters: Vec<ClusterDescriptor>,
    signal: ChangeSignal,
}

/// What was dropped while linking a snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkReport {
    pub dangling_routes: Vec<String>,
    pub duplicate_routes: Vec<String>,
    pub duplicate_clusters: Vec<String>,
}

impl LinkReport {
    pub fn dropped_routes(&self) -> usize {
        self.dangling_routes.len() + self.duplicate_routes.len()
    }
}

impl ConfigSnapshot {
    /// The state before the first successful load.
    pub fn empty() -> Self {
        Self {
            version: 0,
            loaded_at: SystemTime::now(),
            routes: Vec::new(),
            clusters: Vec::new(),
            signal: ChangeSignal::new(),
        }
    }

    /// Link and order descriptors into a new snapshot with a live signal.
    ///
    /// Duplicate ids keep their first occurrence. Routes referencing a
    /// cluster that is not part of this snapshot are dropped.
    pub fn build(
        version: u64,
        routes: Vec<RouteDescriptor>,
        clusters: Vec<ClusterDescriptor>,
    ) -> (Self, LinkReport) {
        let mut report = LinkReport::default();

        let mut cluster_ids = HashSet::with_capacity(clusters.len());
        let mut linked_clusters = Vec::with_capacity(clusters.len());
        for cluster in clusters {
            if cluster_ids.insert(cluster.cluster_id.clone()) {
                linked_clusters.push(cluster);
            } else {
                tracing::warn!(cluster_id = %cluster.cluster_id, "Dropping duplicate cluster");
                report.duplicate_clusters.push(cluster.cluster_id);
            }
        }

        let mut route_ids = HashSet::with_capacity(routes.len());
        let mut linked_routes = Vec::with_capacity(routes.len());
        for route in routes {
            if !cluster_ids.contains(&route.cluster_id) {
                tracing::warn!(
                    route_id = %route.route_id,
                    cluster_id = %route.cluster_id,
                    "Dropping route that references an unknown cluster"
                );
                report.dangling_routes.push(route.route_id);
            } else if !route_ids.insert(route.route_id.clone()) {
                tracing::warn!(route_id = %route.route_id, "Dropping duplicate route");
                report.duplicate_routes.push(route.route_id);
            } else {
                linked_routes.push(route);
            }
        }
        sort_routes(&mut linked_routes);

        let snapshot = Self {
            version,
            loaded_at: SystemTime::now(),
            routes: linked_routes,
            clusters: linked_clusters,
            signal: ChangeSignal::new(),
        };
        (snapshot, report)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn loaded_at(&self) -> SystemTime {
        self.loaded_at
    }

    /// Routes in evaluation order.
    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn clusters(&self) -> &[ClusterDescriptor] {
        &self.clusters
    }

    pub fn route(&self, route_id: &str) -> Option<&RouteDescriptor> {
        self.routes.iter().find(|r| r.route_id == route_id)
    }

    pub fn cluster(&self, cluster_id: &str) -> Option<&ClusterDescriptor> {
        self.clusters.iter().find(|c| c.cluster_id == cluster_id)
    }

    /// Observe this snapshot being superseded.
    pub fn change_token(&self) -> ChangeToken {
        self.signal.token()
    }

    /// True once a newer snapshot has been published.
    pub fn is_stale(&self) -> bool {
        self.signal.is_fired()
    }

    pub(crate) fn signal(&self) -> &ChangeSignal {
        &self.signal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use crate::routing::descriptor::RouteMatch;
    use std::time::Duration;

    fn route(id: &str, cluster: &str, order: i32) -> RouteDescriptor {
        RouteDescriptor {
            route_id: id.into(),
            cluster_id: cluster.into(),
            route_match: RouteMatch {
                path: "/".into(),
                ..Default::default()
            },
            order,
            authorization_policy: None,
            rate_limiter_policy: None,
            cors_policy: None,
            timeout: None,
            transforms: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    fn cluster(id: &str) -> ClusterDescriptor {
        ClusterDescriptor {
            cluster_id: id.into(),
            load_balancing_policy: "RoundRobin".into(),
            destinations: BTreeMap::new(),
            health_check: None,
            session_affinity: None,
            limits: None,
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_build_drops_dangling_and_duplicates() {
        let (snapshot, report) = ConfigSnapshot::build(
            3,
            vec![
                route("b", "c1", 10),
                route("a", "c1", 5),
                route("orphan", "missing", 0),
                route("a", "c1", 1),
            ],
            vec![cluster("c1"), cluster("c1")],
        );

        assert_eq!(snapshot.version(), 3);
        let ids: Vec<_> = snapshot.routes().iter().map(|r| r.route_id.as_str()).collect();
        assert_eq!(ids, ["a", "b"]);
        assert_eq!(snapshot.route("a").map(|r| r.order), Some(5));
        assert_eq!(snapshot.clusters().len(), 1);
        assert_eq!(report.dangling_routes, ["orphan"]);
        assert_eq!(report.duplicate_routes, ["a"]);
        assert_eq!(report.duplicate_clusters, ["c1"]);
        assert_eq!(report.dropped_routes(), 2);
    }

    #[test]
    fn test_empty_snapshot_is_live() {
        let snapshot = ConfigSnapshot::empty();
        assert_eq!(snapshot.version(), 0);
        assert!(snapshot.routes().is_empty());
        assert!(!snapshot.is_stale());
        assert!(!snapshot.change_token().has_changed());
    }

    #[test]
    fn test_signal_fires_once() {
        let signal = ChangeSignal::new();
        assert!(signal.fire());
        assert!(!signal.fire());
        assert!(signal.is_fired());
    }

    #[tokio::test]
    async fn test_token_wakes_waiters_and_late_subscribers() {
        let signal = ChangeSignal::new();
        let mut early = signal.token();
        let waiter = tokio::spawn(async move {
            early.changed().await;
        });

        tokio::task::yield_now().await;
        signal.fire();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();

        let mut late = signal.token();
        assert!(late.has_changed());
        tokio::time::timeout(Duration::from_millis(50), late.changed())
            .await
            .expect("late subscriber resolves immediately");
    }

    #[tokio::test]
    async fn test_dropping_wait_does_not_affect_others() {
        let signal = ChangeSignal::new();
        let mut cancelled = signal.token();
        let mut kept = signal.token();

        let res = tokio::time::timeout(Duration::from_millis(10), cancelled.changed()).await;
        assert!(res.is_err());
        drop(cancelled);

        signal.fire();
        tokio::time::timeout(Duration::from_millis(50), kept.changed())
            .await
            .expect("remaining observer still notified");
    }
}
