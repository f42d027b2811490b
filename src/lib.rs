// polyfed - federation gateway for heterogeneous databases
// Core library

pub mod cache;
pub mod catalog;
pub mod engine;
pub mod federation;
pub mod introspect;
pub mod observability;

use std::sync::Arc;

use regex::Regex;
use tracing::{debug, info};

use cache::{FilterKey, MetadataCache};
use catalog::{is_excluded_namespace, FederationCatalog};
use engine::drivers::{connector_for_url, default_connectors};
use engine::registry::{ConnectorRegistry, DatasourceRegistry};
use engine::traits::Backend;

pub use engine::error::{GatewayError, GatewayResult};
pub use engine::types::{
    AddDatasourceRequest, ColumnDescriptor, ConnectionStatus, DatasourceDescriptor, QueryResult,
    SchemaDescriptor, TableDescriptor,
};

/// The federation gateway: a registry of live backends, a virtual catalog
/// over them, a metadata cache for discovery calls, and a federated query
/// executor.
pub struct Gateway {
    connectors: ConnectorRegistry,
    registry: Arc<DatasourceRegistry>,
    catalog: Arc<FederationCatalog>,
    cache: MetadataCache,
}

impl Gateway {
    pub fn new() -> Self {
        Self::with_connectors(default_connectors())
    }

    /// Builds a gateway with a custom connector set.
    pub fn with_connectors(connectors: ConnectorRegistry) -> Self {
        Self {
            connectors,
            registry: Arc::new(DatasourceRegistry::new()),
            catalog: Arc::new(FederationCatalog::new()),
            cache: MetadataCache::new(),
        }
    }

    /// Registers a new datasource: connect, verify reachability, introspect
    /// into the catalog, and expose it for discovery and queries.
    ///
    /// Nothing is registered unless every step succeeds, and a name
    /// collision leaves the existing registration untouched.
    pub async fn add_datasource(
        &self,
        request: AddDatasourceRequest,
    ) -> GatewayResult<DatasourceDescriptor> {
        if self.registry.contains(&request.name).await {
            return Err(GatewayError::duplicate_name(&request.name));
        }

        let connector = connector_for_url(&self.connectors, &request.url)?;
        let backend = connector.connect(&request).await?;

        if let Err(err) = backend.probe().await {
            backend.close().await;
            return Err(err);
        }

        let subtree = match FederationCatalog::build_subtree(&request.name, backend.as_ref()).await
        {
            Ok(subtree) => subtree,
            Err(err) => {
                backend.close().await;
                return Err(err);
            }
        };

        // insert_new re-checks the name under the write lock, closing the
        // race left open by the pre-check above
        if let Err(err) = self
            .registry
            .insert_new(&request.name, Arc::clone(&backend))
            .await
        {
            backend.close().await;
            return Err(err);
        }
        self.catalog.attach(subtree)?;
        self.cache.invalidate_all();

        info!(
            datasource = %request.name,
            backend = connector.display_name(),
            "datasource registered"
        );

        Ok(DatasourceDescriptor {
            name: request.name,
            connection_status: ConnectionStatus::Connected,
            backend_type: backend.backend_type().to_string(),
            product_name: backend.product_name().await.ok(),
            connection_target: backend.connection_target(),
        })
    }

    /// Lists every registered datasource with a live reachability status.
    pub async fn list_datasources(&self) -> Vec<DatasourceDescriptor> {
        // Captured before the lookup so a concurrent registration turns
        // this listing's store into a no-op instead of a stale entry
        let generation = self.cache.generation();
        if let Some(hit) = self.cache.lookup_datasources() {
            debug!("datasource listing served from cache");
            return hit;
        }

        let descriptors = introspect::for_each_datasource(
            &self.registry,
            introspect::INTROSPECT_TIMEOUT,
            describe_datasource,
        )
        .await;

        self.cache.store_datasources(generation, descriptors.clone());
        descriptors
    }

    /// Lists schemas across all datasources, optionally filtered by a
    /// full-match regex over the dotted qualified name.
    pub async fn list_schemas(&self, filter: Option<&str>) -> GatewayResult<Vec<SchemaDescriptor>> {
        let generation = self.cache.generation();
        let key = FilterKey::from(filter);
        if let Some(hit) = self.cache.lookup_schemas(&key) {
            debug!("schema listing served from cache");
            return Ok(hit);
        }

        let matcher = compile_filter(filter)?;

        let nested = introspect::for_each_datasource(
            &self.registry,
            introspect::INTROSPECT_TIMEOUT,
            schemas_for,
        )
        .await;

        let descriptors: Vec<SchemaDescriptor> = nested
            .into_iter()
            .flatten()
            .filter(|d| matches_filter(&matcher, &d.qualified_path))
            .collect();

        self.cache.store_schemas(generation, key, descriptors.clone());
        Ok(descriptors)
    }

    /// Lists tables across all datasources, optionally filtered by a
    /// full-match regex over the dotted qualified name.
    pub async fn list_tables(&self, filter: Option<&str>) -> GatewayResult<Vec<TableDescriptor>> {
        let generation = self.cache.generation();
        let key = FilterKey::from(filter);
        if let Some(hit) = self.cache.lookup_tables(&key) {
            debug!("table listing served from cache");
            return Ok(hit);
        }

        let matcher = compile_filter(filter)?;

        let nested = introspect::for_each_datasource(
            &self.registry,
            introspect::INTROSPECT_TIMEOUT,
            tables_for,
        )
        .await;

        let descriptors: Vec<TableDescriptor> = nested
            .into_iter()
            .flatten()
            .filter(|d| matches_filter(&matcher, &d.qualified_path))
            .collect();

        self.cache.store_tables(generation, key, descriptors.clone());
        Ok(descriptors)
    }

    /// Executes a (possibly cross-datasource) SQL query.
    pub async fn execute_query(&self, sql: &str) -> GatewayResult<QueryResult> {
        federation::execute_query(sql, &self.registry, &self.catalog).await
    }

    /// Renders the full virtual catalog as human-readable text.
    pub fn dump_catalog(&self) -> String {
        self.catalog.dump()
    }

    /// Closes every registered backend and drops all derived state, so no
    /// listing or catalog dump can describe a closed connection.
    pub async fn shutdown(&self) {
        self.registry.shutdown().await;
        self.catalog.clear();
        self.cache.invalidate_all();
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}

/// Compiles an optional filter into an anchored regex. Patterns match the
/// whole qualified name, never a substring.
fn compile_filter(filter: Option<&str>) -> GatewayResult<Option<Regex>> {
    match filter {
        None => Ok(None),
        Some(pattern) => Regex::new(&format!("^(?:{pattern})$"))
            .map(Some)
            .map_err(|e| GatewayError::invalid_filter(pattern, e.to_string())),
    }
}

fn matches_filter(matcher: &Option<Regex>, qualified_path: &[String]) -> bool {
    match matcher {
        None => true,
        Some(regex) => regex.is_match(&qualified_path.join(".")),
    }
}

async fn describe_datasource(
    name: String,
    backend: Arc<dyn Backend>,
) -> GatewayResult<DatasourceDescriptor> {
    let (connection_status, product_name) = match backend.probe().await {
        Ok(()) => match backend.product_name().await {
            Ok(product) => (ConnectionStatus::Connected, Some(product)),
            // Reachable, but the backend would not identify itself
            Err(_) => (ConnectionStatus::Unknown, None),
        },
        Err(_) => (ConnectionStatus::Disconnected, None),
    };
    Ok(DatasourceDescriptor {
        name,
        connection_status,
        backend_type: backend.backend_type().to_string(),
        product_name,
        connection_target: backend.connection_target(),
    })
}

async fn schemas_for(
    name: String,
    backend: Arc<dyn Backend>,
) -> GatewayResult<Vec<SchemaDescriptor>> {
    let native = backend.list_schemas().await?;
    let user_schemas: Vec<String> = native
        .into_iter()
        .filter(|s| !is_excluded_namespace(s))
        .collect();

    if user_schemas.is_empty() {
        // Flat namespace: the datasource itself is the only schema
        let table_count = backend.list_tables(None).await?.len();
        return Ok(vec![SchemaDescriptor {
            qualified_path: vec![name.clone()],
            datasource: name,
            schema_name: String::new(),
            table_count,
        }]);
    }

    let mut descriptors = Vec::with_capacity(user_schemas.len());
    for schema in user_schemas {
        let table_count = backend.list_tables(Some(&schema)).await?.len();
        descriptors.push(SchemaDescriptor {
            qualified_path: vec![name.clone(), schema.clone()],
            datasource: name.clone(),
            schema_name: schema,
            table_count,
        });
    }
    Ok(descriptors)
}

async fn tables_for(
    name: String,
    backend: Arc<dyn Backend>,
) -> GatewayResult<Vec<TableDescriptor>> {
    let native = backend.list_schemas().await?;
    let user_schemas: Vec<String> = native
        .into_iter()
        .filter(|s| !is_excluded_namespace(s))
        .collect();

    let mut descriptors = Vec::new();
    if user_schemas.is_empty() {
        for table in backend.list_tables(None).await? {
            let columns = backend.table_columns(None, &table).await.unwrap_or_default();
            descriptors.push(TableDescriptor {
                qualified_path: vec![name.clone(), table.clone()],
                schema_name: String::new(),
                table_name: table,
                columns,
            });
        }
    } else {
        for schema in user_schemas {
            for table in backend.list_tables(Some(&schema)).await? {
                let columns = backend
                    .table_columns(Some(&schema), &table)
                    .await
                    .unwrap_or_default();
                descriptors.push(TableDescriptor {
                    qualified_path: vec![name.clone(), schema.clone(), table.clone()],
                    schema_name: schema.clone(),
                    table_name: table,
                    columns,
                });
            }
        }
    }
    Ok(descriptors)
}
