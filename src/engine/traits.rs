// SPDX-License-Identifier: Apache-2.0

//! Backend and Connector trait definitions
//!
//! `Backend` is the core abstraction every datasource family implements: a
//! live, pooled connection handle exposing a liveness probe, metadata
//! reflection, and bounded table fetch. `Connector` is the matching
//! connection factory, keyed by URL scheme.

use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::error::GatewayResult;
use crate::engine::types::{AddDatasourceRequest, ColumnDescriptor, ColumnInfo, Row};

/// A live connection to one registered datasource.
///
/// Implementations own a small read-only-biased pool; every method acquires
/// a connection scoped to the call and releases it on all exit paths.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Backend family label (e.g. "postgres", "mysql", "mongodb")
    fn backend_type(&self) -> &'static str;

    /// Credential-redacted endpoint for display, when known
    fn connection_target(&self) -> Option<String>;

    /// Short read-only liveness check
    async fn probe(&self) -> GatewayResult<()>;

    /// Product name as reported by the backend (e.g. "PostgreSQL 16.2")
    async fn product_name(&self) -> GatewayResult<String>;

    /// Native sub-schemas, excluding well-known system namespaces.
    ///
    /// An empty list means the backend exposes a single flat namespace.
    async fn list_schemas(&self) -> GatewayResult<Vec<String>>;

    /// Tables (or collections) in a sub-schema; `None` for flat backends
    async fn list_tables(&self, schema: Option<&str>) -> GatewayResult<Vec<String>>;

    /// Column metadata for one table
    async fn table_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> GatewayResult<Vec<ColumnDescriptor>>;

    /// Fetches up to `row_limit` rows from a table for federated execution
    async fn fetch_table(
        &self,
        schema: Option<&str>,
        table: &str,
        row_limit: u64,
    ) -> GatewayResult<(Vec<ColumnInfo>, Vec<Row>)>;

    /// Releases the pool deterministically
    async fn close(&self);
}

/// Connection factory for one backend family
#[async_trait]
pub trait Connector: Send + Sync {
    /// URL schemes handled by this connector (e.g. ["postgres", "postgresql"])
    fn schemes(&self) -> &'static [&'static str];

    /// Human-readable family name
    fn display_name(&self) -> &'static str;

    /// Opens a pooled backend handle. Does not probe; the registry does.
    async fn connect(&self, request: &AddDatasourceRequest) -> GatewayResult<Arc<dyn Backend>>;
}
