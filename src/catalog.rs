// SPDX-License-Identifier: Apache-2.0

//! Federation catalog
//!
//! Holds the virtual schema tree the query path resolves against:
//! datasource → sub-schema → table → columns. Backends with no native
//! sub-schemas are attached as a single flat namespace, producing a uniform
//! two-level addressing scheme (`datasource.schema.table` or
//! `datasource.table`) regardless of backend heterogeneity. Well-known
//! system namespaces are excluded case-insensitively and never appear in
//! the tree or its dump.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use parking_lot::RwLock;
use tracing::warn;

use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::traits::Backend;
use crate::engine::types::ColumnDescriptor;

/// Native namespaces that never hold user tables
pub const EXCLUDED_NAMESPACES: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "performance_schema",
    "mysql",
    "sys",
    "metadata",
    "admin",
    "local",
    "config",
];

/// True for namespaces that the catalog and discovery listings skip
pub fn is_excluded_namespace(namespace: &str) -> bool {
    let lower = namespace.to_lowercase();
    EXCLUDED_NAMESPACES.iter().any(|n| *n == lower)
}

#[derive(Debug, Clone)]
pub struct CatalogTable {
    pub name: String,
    pub columns: Vec<ColumnDescriptor>,
}

#[derive(Debug, Clone)]
pub struct CatalogSchema {
    pub name: String,
    pub tables: Vec<CatalogTable>,
}

/// One registered datasource's subtree
#[derive(Debug, Clone)]
pub enum CatalogNode {
    /// Backend exposes no native sub-schemas; tables sit directly under
    /// the datasource name
    Flat { tables: Vec<CatalogTable> },
    /// Backend exposes one or more native sub-schemas
    Schemas(Vec<CatalogSchema>),
}

#[derive(Debug, Clone)]
pub struct CatalogDatasource {
    pub name: String,
    pub node: CatalogNode,
}

/// A qualified table name resolved against the catalog
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTable {
    pub datasource: String,
    pub schema: Option<String>,
    pub table: String,
}

/// The virtual schema tree. Mutation (attach) is rare relative to reads;
/// one coarse lock guards the whole tree.
pub struct FederationCatalog {
    roots: RwLock<BTreeMap<String, CatalogDatasource>>,
}

impl FederationCatalog {
    pub fn new() -> Self {
        Self {
            roots: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.roots.read().contains_key(name)
    }

    pub fn datasource_names(&self) -> Vec<String> {
        self.roots.read().keys().cloned().collect()
    }

    /// Reads a backend's native structure into a detached subtree.
    ///
    /// Column reflection failures on individual tables degrade to an empty
    /// column list rather than failing the whole registration.
    pub async fn build_subtree(
        name: &str,
        backend: &dyn Backend,
    ) -> GatewayResult<CatalogDatasource> {
        let native_schemas = backend.list_schemas().await?;
        let user_schemas: Vec<String> = native_schemas
            .into_iter()
            .filter(|s| !is_excluded_namespace(s))
            .collect();

        let node = if user_schemas.is_empty() {
            CatalogNode::Flat {
                tables: Self::read_tables(name, backend, None).await?,
            }
        } else {
            let mut schemas = Vec::with_capacity(user_schemas.len());
            for schema_name in user_schemas {
                let tables = Self::read_tables(name, backend, Some(&schema_name)).await?;
                schemas.push(CatalogSchema {
                    name: schema_name,
                    tables,
                });
            }
            CatalogNode::Schemas(schemas)
        };

        Ok(CatalogDatasource {
            name: name.to_string(),
            node,
        })
    }

    async fn read_tables(
        datasource: &str,
        backend: &dyn Backend,
        schema: Option<&str>,
    ) -> GatewayResult<Vec<CatalogTable>> {
        let names = backend.list_tables(schema).await?;
        let mut tables = Vec::with_capacity(names.len());
        for table_name in names {
            let columns = match backend.table_columns(schema, &table_name).await {
                Ok(columns) => columns,
                Err(err) => {
                    warn!(
                        datasource,
                        table = %table_name,
                        error = %err,
                        "failed to read columns; registering table without them"
                    );
                    Vec::new()
                }
            };
            tables.push(CatalogTable {
                name: table_name,
                columns,
            });
        }
        Ok(tables)
    }

    /// Attaches a built subtree. The registry's duplicate check runs first,
    /// so a collision here is an internal invariant violation.
    pub fn attach(&self, subtree: CatalogDatasource) -> GatewayResult<()> {
        let mut roots = self.roots.write();
        if roots.contains_key(&subtree.name) {
            return Err(GatewayError::already_present(&subtree.name));
        }
        roots.insert(subtree.name.clone(), subtree);
        Ok(())
    }

    /// Drops every attached subtree. Called on shutdown, after the
    /// backends behind the tree have been closed.
    pub fn clear(&self) {
        self.roots.write().clear();
    }

    /// Builds and attaches in one step
    pub async fn extend(&self, name: &str, backend: &dyn Backend) -> GatewayResult<()> {
        if self.contains(name) {
            return Err(GatewayError::already_present(name));
        }
        let subtree = Self::build_subtree(name, backend).await?;
        self.attach(subtree)
    }

    /// Resolves a qualified name (`ds.table` or `ds.schema.table`) to a
    /// catalog entry.
    pub fn resolve(&self, parts: &[String]) -> Option<ResolvedTable> {
        let roots = self.roots.read();
        let datasource = roots.get(parts.first()?)?;

        match (&datasource.node, parts.len()) {
            (CatalogNode::Flat { tables }, 2) => {
                tables.iter().find(|t| t.name == parts[1]).map(|t| ResolvedTable {
                    datasource: datasource.name.clone(),
                    schema: None,
                    table: t.name.clone(),
                })
            }
            (CatalogNode::Schemas(schemas), 3) => schemas
                .iter()
                .find(|s| s.name == parts[1])
                .and_then(|s| s.tables.iter().find(|t| t.name == parts[2]))
                .map(|t| ResolvedTable {
                    datasource: datasource.name.clone(),
                    schema: Some(parts[1].clone()),
                    table: t.name.clone(),
                }),
            _ => None,
        }
    }

    /// Column metadata for a resolved table, if the catalog holds any
    pub fn table_columns(&self, resolved: &ResolvedTable) -> Vec<ColumnDescriptor> {
        let roots = self.roots.read();
        let Some(datasource) = roots.get(&resolved.datasource) else {
            return Vec::new();
        };
        let tables = match (&datasource.node, &resolved.schema) {
            (CatalogNode::Flat { tables }, None) => tables,
            (CatalogNode::Schemas(schemas), Some(schema)) => {
                match schemas.iter().find(|s| &s.name == schema) {
                    Some(s) => &s.tables,
                    None => return Vec::new(),
                }
            }
            _ => return Vec::new(),
        };
        tables
            .iter()
            .find(|t| t.name == resolved.table)
            .map(|t| t.columns.clone())
            .unwrap_or_default()
    }

    /// Renders the full tree with qualified table names and column types,
    /// for diagnostics and LLM-assisted query authoring.
    pub fn dump(&self) -> String {
        let roots = self.roots.read();
        let mut out = String::new();
        for datasource in roots.values() {
            let _ = writeln!(out, "Datasource: {}", datasource.name);
            match &datasource.node {
                CatalogNode::Flat { tables } => {
                    Self::render_tables(&mut out, &datasource.name, tables, 2);
                }
                CatalogNode::Schemas(schemas) => {
                    for schema in schemas {
                        let qualified = format!("{}.{}", datasource.name, schema.name);
                        let _ = writeln!(out, "  Schema: {qualified}");
                        Self::render_tables(&mut out, &qualified, &schema.tables, 4);
                    }
                }
            }
        }
        out
    }

    fn render_tables(out: &mut String, prefix: &str, tables: &[CatalogTable], indent: usize) {
        if tables.is_empty() {
            return;
        }
        let pad = " ".repeat(indent);
        let _ = writeln!(out, "{pad}Tables:");
        for table in tables {
            let _ = writeln!(out, "{pad}  - {prefix}.{}", table.name);
            for column in &table.columns {
                let _ = writeln!(out, "{pad}      {} ({})", column.name, column.data_type);
            }
        }
    }
}

impl Default for FederationCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use async_trait::async_trait;

    use crate::engine::types::{ColumnInfo, Row};

    /// Backend with a configurable native layout
    struct FixtureBackend {
        /// schema -> tables; a single None key models a flat namespace
        layout: HashMap<Option<String>, Vec<String>>,
    }

    impl FixtureBackend {
        fn flat(tables: &[&str]) -> Arc<Self> {
            let mut layout = HashMap::new();
            layout.insert(None, tables.iter().map(|s| s.to_string()).collect());
            Arc::new(Self { layout })
        }

        fn with_schemas(schemas: &[(&str, &[&str])]) -> Arc<Self> {
            let mut layout = HashMap::new();
            for (schema, tables) in schemas {
                layout.insert(
                    Some(schema.to_string()),
                    tables.iter().map(|s| s.to_string()).collect(),
                );
            }
            Arc::new(Self { layout })
        }
    }

    #[async_trait]
    impl Backend for FixtureBackend {
        fn backend_type(&self) -> &'static str {
            "fixture"
        }

        fn connection_target(&self) -> Option<String> {
            None
        }

        async fn probe(&self) -> GatewayResult<()> {
            Ok(())
        }

        async fn product_name(&self) -> GatewayResult<String> {
            Ok("Fixture".to_string())
        }

        async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
            let mut schemas: Vec<String> =
                self.layout.keys().filter_map(|k| k.clone()).collect();
            schemas.sort();
            Ok(schemas)
        }

        async fn list_tables(&self, schema: Option<&str>) -> GatewayResult<Vec<String>> {
            Ok(self
                .layout
                .get(&schema.map(str::to_string))
                .cloned()
                .unwrap_or_default())
        }

        async fn table_columns(
            &self,
            _schema: Option<&str>,
            _table: &str,
        ) -> GatewayResult<Vec<ColumnDescriptor>> {
            Ok(vec![ColumnDescriptor {
                name: "id".into(),
                data_type: "bigint".into(),
                nullable: false,
                default_value: None,
                is_primary_key: true,
                is_auto_increment: true,
                constraints: Vec::new(),
            }])
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

    #[tokio::test]
    async fn flat_backend_gets_two_part_addressing() {
        let catalog = FederationCatalog::new();
        let backend = FixtureBackend::flat(&["events"]);
        catalog.extend("mongo1", backend.as_ref()).await.unwrap();

        let resolved = catalog
            .resolve(&["mongo1".to_string(), "events".to_string()])
            .unwrap();
        assert_eq!(resolved.schema, None);
        assert_eq!(resolved.table, "events");

        // Three-part addressing does not apply to flat namespaces
        assert!(catalog
            .resolve(&["mongo1".to_string(), "x".to_string(), "events".to_string()])
            .is_none());
    }

    #[tokio::test]
    async fn multi_schema_backend_gets_three_part_addressing() {
        let catalog = FederationCatalog::new();
        let backend = FixtureBackend::with_schemas(&[("public", &["users"][..])]);
        catalog.extend("pg1", backend.as_ref()).await.unwrap();

        let resolved = catalog
            .resolve(&["pg1".to_string(), "public".to_string(), "users".to_string()])
            .unwrap();
        assert_eq!(resolved.schema.as_deref(), Some("public"));
        assert_eq!(resolved.table, "users");
    }

    #[tokio::test]
    async fn system_namespaces_are_excluded_case_insensitively() {
        let catalog = FederationCatalog::new();
        let backend = FixtureBackend::with_schemas(&[
            ("public", &["users"][..]),
            ("Information_Schema", &["tables"][..]),
            ("PG_CATALOG", &["pg_class"][..]),
        ]);
        catalog.extend("pg1", backend.as_ref()).await.unwrap();

        assert!(catalog
            .resolve(&[
                "pg1".to_string(),
                "Information_Schema".to_string(),
                "tables".to_string()
            ])
            .is_none());

        let dump = catalog.dump();
        assert!(dump.contains("pg1.public.users"));
        assert!(!dump.to_lowercase().contains("information_schema"));
        assert!(!dump.to_lowercase().contains("pg_catalog"));
    }

    #[tokio::test]
    async fn duplicate_attach_is_already_present() {
        let catalog = FederationCatalog::new();
        let backend = FixtureBackend::flat(&["events"]);
        catalog.extend("ds", backend.as_ref()).await.unwrap();

        let err = catalog.extend("ds", backend.as_ref()).await.unwrap_err();
        assert!(matches!(err, GatewayError::AlreadyPresent { .. }));
    }

    #[tokio::test]
    async fn dump_lists_qualified_tables_and_column_types() {
        let catalog = FederationCatalog::new();
        catalog
            .extend(
                "pg1",
                FixtureBackend::with_schemas(&[("public", &["users"][..])]).as_ref(),
            )
            .await
            .unwrap();
        catalog
            .extend("mongo1", FixtureBackend::flat(&["events"]).as_ref())
            .await
            .unwrap();

        let dump = catalog.dump();
        assert!(dump.contains("Datasource: pg1"));
        assert!(dump.contains("Schema: pg1.public"));
        assert!(dump.contains("- pg1.public.users"));
        assert!(dump.contains("- mongo1.events"));
        assert!(dump.contains("id (bigint)"));
    }

    #[tokio::test]
    async fn clear_empties_the_tree() {
        let catalog = FederationCatalog::new();
        catalog
            .extend("mongo1", FixtureBackend::flat(&["events"]).as_ref())
            .await
            .unwrap();

        catalog.clear();

        assert!(catalog.datasource_names().is_empty());
        assert!(catalog.dump().is_empty());
        assert!(catalog
            .resolve(&["mongo1".to_string(), "events".to_string()])
            .is_none());
    }

    #[tokio::test]
    async fn table_columns_returns_catalog_metadata() {
        let catalog = FederationCatalog::new();
        catalog
            .extend("mongo1", FixtureBackend::flat(&["events"]).as_ref())
            .await
            .unwrap();

        let resolved = catalog
            .resolve(&["mongo1".to_string(), "events".to_string()])
            .unwrap();
        let columns = catalog.table_columns(&resolved);
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "id");
    }
}
