//! Typed route and cluster descriptors.
//!
//! These are the immutable values a snapshot carries. They are built
//! field-by-field by the translator and never mutated afterwards.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

pub const DEFAULT_LOAD_BALANCING_POLICY: &str = "RoundRobin";
pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_HEALTH_CHECK_PATH: &str = "/health";
pub const DEFAULT_AFFINITY_POLICY: &str = "Cookie";
pub const DEFAULT_AFFINITY_KEY_NAME: &str = ".IdentityGateway.Affinity";

/// How a header or query predicate compares values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchMode {
    Exact,
    Prefix,
    Contains,
    /// Present with any value; `values` is ignored.
    Exists,
}

/// A predicate on a request header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderMatch {
    pub name: String,
    pub values: Vec<String>,
    pub mode: MatchMode,
    pub case_sensitive: bool,
}

/// A predicate on a query string parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QueryParameterMatch {
    pub name: String,
    pub values: Vec<String>,
    pub mode: MatchMode,
    pub case_sensitive: bool,
}

/// What a route matches on. Absent lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteMatch {
    pub path: String,
    pub methods: Option<Vec<String>>,
    pub hosts: Option<Vec<String>>,
    pub headers: Option<Vec<HeaderMatch>>,
    pub query_parameters: Option<Vec<QueryParameterMatch>>,
}

/// When a response header transform applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseCondition {
    Always,
    Success,
}

/// A single request/response rewrite, applied in list order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum Transform {
    PathPrefix {
        prefix: String,
    },
    PathRemovePrefix {
        prefix: String,
    },
    RequestHeader {
        name: String,
        value: String,
        append: bool,
    },
    ResponseHeader {
        name: String,
        value: String,
        append: bool,
        when: ResponseCondition,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RouteDescriptor {
    pub route_id: String,
    pub cluster_id: String,
    pub route_match: RouteMatch,
    /// Lower values are evaluated first.
    pub order: i32,
    pub authorization_policy: Option<String>,
    pub rate_limiter_policy: Option<String>,
    pub cors_policy: Option<String>,
    pub timeout: Option<Duration>,
    pub transforms: Vec<Transform>,
    pub metadata: BTreeMap<String, String>,
}

impl RouteDescriptor {
    /// Evaluation order: `order` ascending, then `route_id` ascending.
    pub fn evaluation_order(a: &RouteDescriptor, b: &RouteDescriptor) -> Ordering {
        a.order
            .cmp(&b.order)
            .then_with(|| a.route_id.cmp(&b.route_id))
    }
}

/// Sort routes into evaluation order.
pub fn sort_routes(routes: &mut [RouteDescriptor]) {
    routes.sort_by(RouteDescriptor::evaluation_order);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveHealthCheck {
    pub enabled: bool,
    pub interval: Duration,
    pub timeout: Duration,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionAffinity {
    pub enabled: bool,
    pub policy: String,
    pub affinity_key_name: String,
}

/// Per-connection and per-request limits toward destinations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClusterLimits {
    pub max_connections_per_destination: Option<u32>,
    pub request_activity_timeout: Option<Duration>,
    pub max_request_body_size: Option<u64>,
}

impl ClusterLimits {
    pub fn is_empty(&self) -> bool {
        self == &ClusterLimits::default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    pub cluster_id: String,
    pub load_balancing_policy: String,
    /// Destination id → address.
    pub destinations: BTreeMap<String, String>,
    pub health_check: Option<ActiveHealthCheck>,
    pub session_affinity: Option<SessionAffinity>,
    pub limits: Option<ClusterLimits>,
    pub metadata: BTreeMap<String, String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(id: &str, order: i32) -> RouteDescriptor {
        RouteDescriptor {
            route_id: id.into(),
            cluster_id: "c".into(),
            route_match: RouteMatch::default(),
            order,
            authorization_policy: None,
            rate_limiter_policy: None,
            cors_policy: None,
            timeout: None,
            transforms: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    #[test]
    fn test_lower_order_first() {
        let mut routes = vec![route("slow", 10), route("fast", 5)];
        sort_routes(&mut routes);
        assert_eq!(routes[0].route_id, "fast");
        assert_eq!(routes[1].route_id, "slow");
    }

    #[test]
    fn test_ties_broken_by_route_id() {
        let mut routes = vec![route("zeta", 1), route("alpha", 1), route("mid", 0)];
        sort_routes(&mut routes);
        let ids: Vec<_> = routes.iter().map(|r| r.route_id.as_str()).collect();
        assert_eq!(ids, ["mid", "alpha", "zeta"]);
    }
}
