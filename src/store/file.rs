//! JSON document store.
//!
//! The daemon's persistent topology lives in one JSON file shaped like
//! [`StoreDocument`]. The file is re-read on every call so edits made by
//! other tools are visible to the next reload without restarting.

use std::path::PathBuf;

use async_trait::async_trait;

use super::models::StoreDocument;
use super::{
    IdentityStore, IpRule, IpRuleKind, Permission, RateLimitPolicy, RawClusterRow, RawRouteRow,
    Role, RouteStore, StoreError, SystemConfigEntry, Topology,
};

#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn load(&self) -> Result<StoreDocument, StoreError> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(StoreDocument::default());
        }
        let document = serde_json::from_str(&content)?;
        Ok(document)
    }
}

#[async_trait]
impl RouteStore for JsonFileStore {
    async fn list_enabled_routes(&self) -> Result<Vec<RawRouteRow>, StoreError> {
        Ok(self.load().await?.enabled_routes())
    }

    async fn list_enabled_clusters(&self) -> Result<Vec<RawClusterRow>, StoreError> {
        Ok(self.load().await?.enabled_clusters())
    }

    async fn load_topology(&self) -> Result<Topology, StoreError> {
        let document = self.load().await?;
        Ok(Topology {
            routes: document.enabled_routes(),
            clusters: document.enabled_clusters(),
        })
    }
}

#[async_trait]
impl IdentityStore for JsonFileStore {
    async fn list_system_configs(&self) -> Result<Vec<SystemConfigEntry>, StoreError> {
        Ok(self.load().await?.system_configs)
    }

    async fn list_roles(&self) -> Result<Vec<Role>, StoreError> {
        Ok(self.load().await?.roles)
    }

    async fn list_permissions(&self) -> Result<Vec<Permission>, StoreError> {
        Ok(self.load().await?.permissions)
    }

    async fn list_rate_limit_policies(&self) -> Result<Vec<RateLimitPolicy>, StoreError> {
        Ok(self.load().await?.rate_limit_policies)
    }

    async fn list_active_ip_rules(&self, kind: IpRuleKind) -> Result<Vec<IpRule>, StoreError> {
        Ok(self.load().await?.effective_ip_rules(kind))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_reads_enabled_rows_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "routes": [
                    {{"routeId": "r1", "clusterId": "c1", "matchPath": "/a", "isEnabled": true}},
                    {{"routeId": "r2", "clusterId": "c1", "matchPath": "/b", "isEnabled": false}}
                ],
                "clusters": [{{"clusterId": "c1", "isEnabled": true}}],
                "roles": [{{"id": "1", "name": "Admin"}}]
            }}"#
        )
        .unwrap();

        let store = JsonFileStore::new(file.path());
        let routes = store.list_enabled_routes().await.unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].route_id, "r1");
        assert_eq!(store.list_enabled_clusters().await.unwrap().len(), 1);
        assert_eq!(store.list_roles().await.unwrap()[0].name, "Admin");
        assert!(store.list_permissions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_topology_comes_from_one_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "routes": [{{"routeId": "r1", "clusterId": "c2", "matchPath": "/a", "isEnabled": true}}],
                "clusters": [
                    {{"clusterId": "c1", "isEnabled": false}},
                    {{"clusterId": "c2", "isEnabled": true}}
                ]
            }}"#
        )
        .unwrap();

        let store = JsonFileStore::new(file.path());
        let topology = store.load_topology().await.unwrap();
        assert_eq!(topology.routes.len(), 1);
        assert_eq!(topology.clusters.len(), 1);
        assert_eq!(topology.clusters[0].cluster_id, topology.routes[0].cluster_id);

        std::fs::write(file.path(), "{ broken").unwrap();
        assert!(matches!(store.load_topology().await, Err(StoreError::Parse(_))));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let store = JsonFileStore::new("/nonexistent/identity-gateway/store.json");
        assert!(matches!(
            store.list_enabled_routes().await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        let store = JsonFileStore::new(file.path());
        assert!(matches!(
            store.list_enabled_clusters().await,
            Err(StoreError::Parse(_))
        ));
    }
}
