//! Persisted row and entity types.
//!
//! Route and cluster rows carry their structured sub-documents as raw JSON
//! text, exactly as they sit in the store. Turning them into typed
//! descriptors is the translator's job.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// A persisted routing rule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawRouteRow {
    pub route_id: String,
    pub cluster_id: String,

    /// Path pattern, e.g. `/api/{**catch-all}`.
    pub match_path: String,

    /// Comma-separated HTTP methods.
    pub match_methods: Option<String>,

    /// Comma-separated host names.
    pub match_hosts: Option<String>,

    /// JSON array of header predicates.
    pub match_headers: Option<String>,

    /// JSON array of query parameter predicates.
    pub match_query_parameters: Option<String>,

    /// Lower values are evaluated first.
    pub order: i32,

    pub authorization_policy: Option<String>,
    pub rate_limiter_policy: Option<String>,
    pub cors_policy: Option<String>,
    pub timeout_seconds: Option<u64>,

    /// JSON array of string maps, one per transform.
    pub transforms: Option<String>,

    /// JSON object of string values.
    pub metadata: Option<String>,

    pub is_enabled: bool,
}

/// A persisted backend pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawClusterRow {
    pub cluster_id: String,
    pub load_balancing_policy: Option<String>,

    /// JSON document, either an array of destination objects or an object
    /// keyed by destination id.
    pub destinations: Option<String>,

    pub health_check_enabled: bool,
    pub health_check_interval_secs: Option<u64>,
    pub health_check_timeout_secs: Option<u64>,
    pub health_check_path: Option<String>,

    pub session_affinity_enabled: bool,
    pub session_affinity_policy: Option<String>,
    pub session_affinity_key_name: Option<String>,

    pub max_connections_per_destination: Option<u32>,
    pub request_activity_timeout_secs: Option<u64>,
    pub max_request_body_size: Option<u64>,

    /// JSON object of string values.
    pub metadata: Option<String>,

    pub is_enabled: bool,
}

/// A system configuration key/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemConfigEntry {
    pub group: String,
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub is_system: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: String,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitPolicy {
    pub id: String,
    pub name: String,
    pub permit_limit: u32,
    pub window_secs: u64,
    #[serde(default)]
    pub queue_limit: u32,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Whether an IP rule denies or allows traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum IpRuleKind {
    Blacklist,
    Whitelist,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IpRule {
    pub id: String,
    /// Single address or CIDR block.
    pub address: String,
    pub kind: IpRuleKind,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Expiry as seconds since the Unix epoch.
    #[serde(default)]
    pub expires_at: Option<u64>,
}

impl IpRule {
    /// Active and not past its expiry.
    pub fn is_effective(&self) -> bool {
        if !self.is_active {
            return false;
        }
        match self.expires_at {
            Some(expiry) => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs();
                expiry > now
            }
            None => true,
        }
    }
}

/// All effective IP rules, cached together under one key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct IpRuleSet {
    pub blacklist: Vec<IpRule>,
    pub whitelist: Vec<IpRule>,
}

impl IpRuleSet {
    pub fn len(&self) -> usize {
        self.blacklist.len() + self.whitelist.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Everything a store holds, in one serializable document.
///
/// This is the on-disk shape read by [`JsonFileStore`](super::JsonFileStore)
/// and the in-memory state of [`MemoryStore`](super::MemoryStore).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreDocument {
    pub routes: Vec<RawRouteRow>,
    pub clusters: Vec<RawClusterRow>,
    pub system_configs: Vec<SystemConfigEntry>,
    pub roles: Vec<Role>,
    pub permissions: Vec<Permission>,
    pub rate_limit_policies: Vec<RateLimitPolicy>,
    pub ip_rules: Vec<IpRule>,
}

impl StoreDocument {
    pub fn enabled_routes(&self) -> Vec<RawRouteRow> {
        self.routes.iter().filter(|r| r.is_enabled).cloned().collect()
    }

    pub fn enabled_clusters(&self) -> Vec<RawClusterRow> {
        self.clusters.iter().filter(|c| c.is_enabled).cloned().collect()
    }

    pub fn effective_ip_rules(&self, kind: IpRuleKind) -> Vec<IpRule> {
        self.ip_rules
            .iter()
            .filter(|r| r.kind == kind && r.is_effective())
            .cloned()
            .collect()
    }
}
