//! Row → descriptor conversion.
//!
//! # Responsibilities
//! - Split comma lists (methods, hosts)
//! - Parse embedded JSON documents (predicates, transforms, metadata,
//!   destinations)
//! - Fill defaults for health checks, session affinity, load balancing
//! - Skip rows that fail to convert, logging each once
//!
//! # Design Decisions
//! - Header and query predicate documents are strict: a malformed one fails
//!   the row, since dropping a predicate would widen what the route matches
//! - Metadata and transforms are lenient: a malformed document yields an
//!   empty value for that field only
//! - Destinations accept both the array-of-objects and object-keyed shapes
//! - Pure apart from logging; no I/O

use std::collections::BTreeMap;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::observability::metrics;
use crate::routing::descriptor::{
    ActiveHealthCheck, ClusterDescriptor, ClusterLimits, HeaderMatch, MatchMode,
    QueryParameterMatch, ResponseCondition, RouteDescriptor, RouteMatch, SessionAffinity,
    Transform, DEFAULT_AFFINITY_KEY_NAME, DEFAULT_AFFINITY_POLICY, DEFAULT_HEALTH_CHECK_INTERVAL,
    DEFAULT_HEALTH_CHECK_PATH, DEFAULT_HEALTH_CHECK_TIMEOUT, DEFAULT_LOAD_BALANCING_POLICY,
};
use crate::store::{RawClusterRow, RawRouteRow};

/// Why a single row could not be converted.
#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("'{field}' document is malformed: {source}")]
    MalformedDocument {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("unknown match mode '{0}'")]
    UnknownMatchMode(String),
}

/// Output of one translation pass.
#[derive(Debug, Clone, Default)]
pub struct TranslatedConfig {
    pub routes: Vec<RouteDescriptor>,
    pub clusters: Vec<ClusterDescriptor>,
    /// Rows that failed to convert.
    pub skipped_routes: usize,
    pub skipped_clusters: usize,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigTranslator;

impl ConfigTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Convert a batch of enabled rows. Never fails as a whole.
    pub fn translate(&self, routes: &[RawRouteRow], clusters: &[RawClusterRow]) -> TranslatedConfig {
        let (routes, skipped_routes) = self.translate_routes(routes);
        let (clusters, skipped_clusters) = self.translate_clusters(clusters);
        TranslatedConfig {
            routes,
            clusters,
            skipped_routes,
            skipped_clusters,
        }
    }

    /// Returns the converted routes and the number of skipped rows.
    pub fn translate_routes(&self, rows: &[RawRouteRow]) -> (Vec<RouteDescriptor>, usize) {
        let mut routes = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in rows {
            match convert_route(row) {
                Ok(route) => routes.push(route),
                Err(e) => {
                    skipped += 1;
                    metrics::record_row_skipped("route");
                    tracing::warn!(route_id = %row.route_id, error = %e, "Skipping route row that failed to convert");
                }
            }
        }
        (routes, skipped)
    }

    /// Returns the converted clusters and the number of skipped rows.
    pub fn translate_clusters(&self, rows: &[RawClusterRow]) -> (Vec<ClusterDescriptor>, usize) {
        let mut clusters = Vec::with_capacity(rows.len());
        let mut skipped = 0;
        for row in rows {
            match convert_cluster(row) {
                Ok(cluster) => clusters.push(cluster),
                Err(e) => {
                    skipped += 1;
                    metrics::record_row_skipped("cluster");
                    tracing::warn!(cluster_id = %row.cluster_id, error = %e, "Skipping cluster row that failed to convert");
                }
            }
        }
        (clusters, skipped)
    }
}

pub fn convert_route(row: &RawRouteRow) -> Result<RouteDescriptor, TranslateError> {
    let route_id = required(&row.route_id, "routeId")?;
    let cluster_id = required(&row.cluster_id, "clusterId")?;

    let hosts = split_list(row.match_hosts.as_deref());
    let path = row.match_path.trim();
    if path.is_empty() && hosts.is_none() {
        return Err(TranslateError::MissingField("matchPath"));
    }

    let headers = parse_strict::<Vec<RawPredicate>>("matchHeaders", row.match_headers.as_deref())?
        .map(header_matches)
        .transpose()?;
    let query_parameters = parse_strict::<Vec<RawPredicate>>(
        "matchQueryParameters",
        row.match_query_parameters.as_deref(),
    )?
    .map(query_matches)
    .transpose()?;

    Ok(RouteDescriptor {
        route_id,
        cluster_id,
        route_match: RouteMatch {
            path: path.to_string(),
            methods: split_list(row.match_methods.as_deref())
                .map(|methods| methods.into_iter().map(|m| m.to_ascii_uppercase()).collect()),
            hosts,
            headers,
            query_parameters,
        },
        order: row.order,
        authorization_policy: non_blank(row.authorization_policy.as_deref()),
        rate_limiter_policy: non_blank(row.rate_limiter_policy.as_deref()),
        cors_policy: non_blank(row.cors_policy.as_deref()),
        timeout: row.timeout_seconds.filter(|s| *s > 0).map(Duration::from_secs),
        transforms: parse_transforms(&row.route_id, row.transforms.as_deref()),
        metadata: parse_metadata(&row.route_id, row.metadata.as_deref()),
    })
}

pub fn convert_cluster(row: &RawClusterRow) -> Result<ClusterDescriptor, TranslateError> {
    let cluster_id = required(&row.cluster_id, "clusterId")?;

    let health_check = row.health_check_enabled.then(|| ActiveHealthCheck {
        enabled: true,
        interval: row
            .health_check_interval_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEALTH_CHECK_INTERVAL),
        timeout: row
            .health_check_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_HEALTH_CHECK_TIMEOUT),
        path: non_blank(row.health_check_path.as_deref())
            .unwrap_or_else(|| DEFAULT_HEALTH_CHECK_PATH.to_string()),
    });

    let session_affinity = row.session_affinity_enabled.then(|| SessionAffinity {
        enabled: true,
        policy: non_blank(row.session_affinity_policy.as_deref())
            .unwrap_or_else(|| DEFAULT_AFFINITY_POLICY.to_string()),
        affinity_key_name: non_blank(row.session_affinity_key_name.as_deref())
            .unwrap_or_else(|| DEFAULT_AFFINITY_KEY_NAME.to_string()),
    });

    let limits = ClusterLimits {
        max_connections_per_destination: row.max_connections_per_destination,
        request_activity_timeout: row.request_activity_timeout_secs.map(Duration::from_secs),
        max_request_body_size: row.max_request_body_size,
    };

    Ok(ClusterDescriptor {
        cluster_id,
        load_balancing_policy: non_blank(row.load_balancing_policy.as_deref())
            .unwrap_or_else(|| DEFAULT_LOAD_BALANCING_POLICY.to_string()),
        destinations: parse_destinations(row.destinations.as_deref()),
        health_check,
        session_affinity,
        limits: (!limits.is_empty()).then_some(limits),
        metadata: parse_metadata(&row.cluster_id, row.metadata.as_deref()),
    })
}

/// Parse a destinations document.
///
/// Accepts `[{"destinationId": "d1", "address": "..."}]` (id may be `id`,
/// and falls back to `destination{n}`), or `{"d1": {"Address": "..."}}`.
/// Anything unparseable yields an empty map.
pub fn parse_destinations(document: Option<&str>) -> BTreeMap<String, String> {
    let mut destinations = BTreeMap::new();
    let Some(text) = document.map(str::trim).filter(|t| !t.is_empty()) else {
        return destinations;
    };
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Destinations document is not valid JSON");
            return destinations;
        }
    };

    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                let Some(object) = item.as_object() else {
                    continue;
                };
                let Some(address) = string_field(object, &["address", "Address"]) else {
                    continue;
                };
                let id = string_field(object, &["destinationId", "DestinationId", "id", "Id"])
                    .unwrap_or_else(|| format!("destination{}", index + 1));
                destinations.insert(id, address);
            }
        }
        Value::Object(entries) => {
            for (id, entry) in entries {
                let address = match &entry {
                    Value::Object(object) => string_field(object, &["Address", "address"]),
                    Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                    _ => None,
                };
                if let Some(address) = address {
                    destinations.insert(id, address);
                }
            }
        }
        _ => {}
    }
    destinations
}

/// Header/query predicate as persisted. Accepts PascalCase and camelCase.
#[derive(Debug, Deserialize)]
struct RawPredicate {
    #[serde(alias = "Name")]
    name: String,
    #[serde(default, alias = "Values")]
    values: Vec<String>,
    #[serde(default, alias = "Mode")]
    mode: Option<String>,
    #[serde(default, rename = "isCaseSensitive", alias = "IsCaseSensitive")]
    case_sensitive: bool,
}

fn header_matches(raw: Vec<RawPredicate>) -> Result<Vec<HeaderMatch>, TranslateError> {
    let mut matches = Vec::with_capacity(raw.len());
    for p in raw {
        matches.push(HeaderMatch {
            mode: parse_mode(p.mode.as_deref())?,
            name: p.name,
            values: p.values,
            case_sensitive: p.case_sensitive,
        });
    }
    Ok(matches)
}

fn query_matches(raw: Vec<RawPredicate>) -> Result<Vec<QueryParameterMatch>, TranslateError> {
    let mut matches = Vec::with_capacity(raw.len());
    for p in raw {
        matches.push(QueryParameterMatch {
            mode: parse_mode(p.mode.as_deref())?,
            name: p.name,
            values: p.values,
            case_sensitive: p.case_sensitive,
        });
    }
    Ok(matches)
}

fn parse_mode(mode: Option<&str>) -> Result<MatchMode, TranslateError> {
    let Some(mode) = mode.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(MatchMode::Exact);
    };
    match mode.to_ascii_lowercase().as_str() {
        "exact" | "exactheader" | "exactquery" => Ok(MatchMode::Exact),
        "prefix" | "headerprefix" | "queryprefix" => Ok(MatchMode::Prefix),
        "contains" | "headercontains" | "querycontains" => Ok(MatchMode::Contains),
        "exists" => Ok(MatchMode::Exists),
        _ => Err(TranslateError::UnknownMatchMode(mode.to_string())),
    }
}

fn parse_transforms(owner: &str, document: Option<&str>) -> Vec<Transform> {
    let Some(entries) = parse_lenient::<Vec<Map<String, Value>>>(owner, "transforms", document)
    else {
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let transform = string_fields(entry).and_then(|fields| transform_from_entry(&fields));
            if transform.is_none() {
                tracing::debug!(owner = %owner, entry = ?entry, "Ignoring unrecognized transform");
            }
            transform
        })
        .collect()
}

/// Every value of a transform entry must be a string; otherwise the entry is skipped.
fn string_fields(entry: &Map<String, Value>) -> Option<BTreeMap<&str, String>> {
    entry
        .iter()
        .map(|(k, v)| v.as_str().map(|v| (k.as_str(), v.to_string())))
        .collect()
}

fn transform_from_entry(entry: &BTreeMap<&str, String>) -> Option<Transform> {
    if let Some(prefix) = entry.get("PathPrefix") {
        return Some(Transform::PathPrefix {
            prefix: prefix.clone(),
        });
    }
    if let Some(prefix) = entry.get("PathRemovePrefix") {
        return Some(Transform::PathRemovePrefix {
            prefix: prefix.clone(),
        });
    }
    let (value, append) = match (entry.get("Set"), entry.get("Append")) {
        (Some(v), _) => (v.clone(), false),
        (None, Some(v)) => (v.clone(), true),
        (None, None) => return None,
    };
    if let Some(name) = entry.get("RequestHeader") {
        return Some(Transform::RequestHeader {
            name: name.clone(),
            value,
            append,
        });
    }
    if let Some(name) = entry.get("ResponseHeader") {
        let when = match entry.get("When").map(|w| w.to_ascii_lowercase()) {
            Some(w) if w == "success" => ResponseCondition::Success,
            _ => ResponseCondition::Always,
        };
        return Some(Transform::ResponseHeader {
            name: name.clone(),
            value,
            append,
            when,
        });
    }
    None
}

fn parse_metadata(owner: &str, document: Option<&str>) -> BTreeMap<String, String> {
    parse_lenient::<BTreeMap<String, Value>>(owner, "metadata", document)
        .map(|entries| {
            entries
                .into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}

/// Blank documents are absent; malformed ones fail the row.
fn parse_strict<T: DeserializeOwned>(
    field: &'static str,
    document: Option<&str>,
) -> Result<Option<T>, TranslateError> {
    match document.map(str::trim).filter(|d| !d.is_empty()) {
        Some(text) => serde_json::from_str(text)
            .map(Some)
            .map_err(|source| TranslateError::MalformedDocument { field, source }),
        None => Ok(None),
    }
}

/// Blank or malformed documents are absent.
fn parse_lenient<T: DeserializeOwned>(owner: &str, field: &'static str, document: Option<&str>) -> Option<T> {
    let text = document.map(str::trim).filter(|d| !d.is_empty())?;
    match serde_json::from_str(text) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!(owner = %owner, field, error = %e, "Ignoring malformed document");
            None
        }
    }
}

/// Split a comma list, trimming entries and dropping empties.
pub fn split_list(list: Option<&str>) -> Option<Vec<String>> {
    let items: Vec<String> = list?
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    (!items.is_empty()).then_some(items)
}

fn required(value: &str, field: &'static str) -> Result<String, TranslateError> {
    let value = value.trim();
    if value.is_empty() {
        Err(TranslateError::MissingField(field))
    } else {
        Ok(value.to_string())
    }
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn string_field(object: &Map<String, Value>, names: &[&str]) -> Option<String> {
    names
        .iter()
        .filter_map(|name| object.get(*name))
        .filter_map(Value::as_str)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}
