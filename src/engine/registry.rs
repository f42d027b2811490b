// SPDX-License-Identifier: Apache-2.0

//! Connector and datasource registries
//!
//! `ConnectorRegistry` holds the available backend families (plugin-like,
//! keyed by URL scheme). `DatasourceRegistry` is the SINGLE SOURCE OF TRUTH
//! for live backend handles: name → connection, duplicate names rejected.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::warn;

use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::traits::{Backend, Connector};

/// Registry that holds all available backend connectors
pub struct ConnectorRegistry {
    connectors: HashMap<&'static str, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: HashMap::new(),
        }
    }

    /// Registers a connector under every scheme it declares.
    pub fn register(&mut self, connector: Arc<dyn Connector>) {
        for scheme in connector.schemes() {
            self.connectors.insert(scheme, Arc::clone(&connector));
        }
    }

    /// Resolves a connector by URL scheme
    pub fn get(&self, scheme: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(scheme).cloned()
    }

    /// Lists all registered schemes, sorted
    pub fn schemes(&self) -> Vec<&'static str> {
        let mut schemes: Vec<&'static str> = self.connectors.keys().copied().collect();
        schemes.sort_unstable();
        schemes
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative mapping of datasource name → live backend handle.
///
/// Mutation (insert) is rare relative to reads; a single coarse lock over
/// the whole map is the concurrency discipline. Handles are created at
/// registration and released only at shutdown.
pub struct DatasourceRegistry {
    datasources: RwLock<HashMap<String, Arc<dyn Backend>>>,
}

impl DatasourceRegistry {
    pub fn new() -> Self {
        Self {
            datasources: RwLock::new(HashMap::new()),
        }
    }

    /// Inserts a new datasource, rejecting duplicate names atomically.
    pub async fn insert_new(&self, name: &str, backend: Arc<dyn Backend>) -> GatewayResult<()> {
        let mut datasources = self.datasources.write().await;
        if datasources.contains_key(name) {
            return Err(GatewayError::duplicate_name(name));
        }
        datasources.insert(name.to_string(), backend);
        Ok(())
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.datasources.read().await.contains_key(name)
    }

    /// Looks up a live handle by name
    pub async fn get(&self, name: &str) -> GatewayResult<Arc<dyn Backend>> {
        let datasources = self.datasources.read().await;
        datasources
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::not_found(name))
    }

    /// Snapshot of all entries, sorted by name for deterministic fan-out
    pub async fn snapshot(&self) -> Vec<(String, Arc<dyn Backend>)> {
        let datasources = self.datasources.read().await;
        let mut entries: Vec<(String, Arc<dyn Backend>)> = datasources
            .iter()
            .map(|(name, backend)| (name.clone(), Arc::clone(backend)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Registered names, sorted
    pub async fn names(&self) -> Vec<String> {
        self.snapshot().await.into_iter().map(|(name, _)| name).collect()
    }

    pub async fn len(&self) -> usize {
        self.datasources.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.datasources.read().await.is_empty()
    }

    /// Closes every held backend and clears the map.
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Arc<dyn Backend>)> = {
            let mut datasources = self.datasources.write().await;
            datasources.drain().collect()
        };
        for (name, backend) in drained {
            warn!(datasource = %name, "closing backend at shutdown");
            backend.close().await;
        }
    }
}

impl Default for DatasourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::engine::error::GatewayResult;
    use crate::engine::types::{AddDatasourceRequest, ColumnDescriptor, ColumnInfo, Row};

    pub(crate) struct MockBackend {
        pub kind: &'static str,
    }

    #[async_trait]
    impl Backend for MockBackend {
        fn backend_type(&self) -> &'static str {
            self.kind
        }

        fn connection_target(&self) -> Option<String> {
            Some(format!("{}://localhost", self.kind))
        }

        async fn probe(&self) -> GatewayResult<()> {
            Ok(())
        }

        async fn product_name(&self) -> GatewayResult<String> {
            Ok("Mock".to_string())
        }

        async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
            Ok(vec![])
        }

        async fn list_tables(&self, _schema: Option<&str>) -> GatewayResult<Vec<String>> {
            Ok(vec![])
        }

        async fn table_columns(
            &self,
            _schema: Option<&str>,
            _table: &str,
        ) -> GatewayResult<Vec<ColumnDescriptor>> {
            Ok(vec![])
        }

        async fn fetch_table(
            &self,
            _schema: Option<&str>,
            _table: &str,
            _row_limit: u64,
        ) -> GatewayResult<(Vec<ColumnInfo>, Vec<Row>)> {
            Ok((vec![], vec![]))
        }

        async fn close(&self) {}
    }

    struct MockConnector;

    #[async_trait]
    impl Connector for MockConnector {
        fn schemes(&self) -> &'static [&'static str] {
            &["mock", "mock2"]
        }

        fn display_name(&self) -> &'static str {
            "Mock"
        }

        async fn connect(
            &self,
            _request: &AddDatasourceRequest,
        ) -> GatewayResult<Arc<dyn Backend>> {
            Ok(Arc::new(MockBackend { kind: "mock" }))
        }
    }

    #[test]
    fn connector_registry_resolves_all_schemes() {
        let mut registry = ConnectorRegistry::new();
        assert!(registry.is_empty());

        registry.register(Arc::new(MockConnector));
        assert!(registry.get("mock").is_some());
        assert!(registry.get("mock2").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.schemes(), vec!["mock", "mock2"]);
    }

    #[tokio::test]
    async fn duplicate_insert_is_rejected_and_state_unchanged() {
        let registry = DatasourceRegistry::new();
        registry
            .insert_new("ds1", Arc::new(MockBackend { kind: "mock" }))
            .await
            .unwrap();

        let err = registry
            .insert_new("ds1", Arc::new(MockBackend { kind: "other" }))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::DuplicateName { .. }));

        assert_eq!(registry.len().await, 1);
        let kept = registry.get("ds1").await.unwrap();
        assert_eq!(kept.backend_type(), "mock");
    }

    #[tokio::test]
    async fn get_unknown_name_is_not_found() {
        let registry = DatasourceRegistry::new();
        let err = registry.get("missing").await.err().unwrap();
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test]
    async fn snapshot_is_sorted_by_name() {
        let registry = DatasourceRegistry::new();
        registry
            .insert_new("zeta", Arc::new(MockBackend { kind: "mock" }))
            .await
            .unwrap();
        registry
            .insert_new("alpha", Arc::new(MockBackend { kind: "mock" }))
            .await
            .unwrap();

        let names = registry.names().await;
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[tokio::test]
    async fn shutdown_clears_all() {
        let registry = DatasourceRegistry::new();
        registry
            .insert_new("ds1", Arc::new(MockBackend { kind: "mock" }))
            .await
            .unwrap();
        registry.shutdown().await;
        assert!(registry.is_empty().await);
    }
}
