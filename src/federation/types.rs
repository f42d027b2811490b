// SPDX-License-Identifier: Apache-2.0

//! Types for the federated execution pipeline

use std::time::Duration;

/// A qualified table reference found in a federated query.
///
/// Multi-schema backends are addressed as `datasource.schema.table`;
/// flat-namespace backends as `datasource.table`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub datasource: String,
    pub schema: Option<String>,
    pub table: String,
    /// Local temp table name in the rewritten query, e.g. `__fed_users_0`
    pub local_alias: String,
}

impl TableRef {
    /// The dotted name as written in the original query, used as the
    /// rewrite mapping key.
    pub fn dotted_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}.{}", self.datasource, schema, self.table),
            None => format!("{}.{}", self.datasource, self.table),
        }
    }
}

/// Fetch plan for a single source table
#[derive(Debug, Clone)]
pub struct SourceFetchPlan {
    pub table_ref: TableRef,
    /// Safety cap on rows pulled from the source
    pub row_limit: u64,
}

/// Complete execution plan for one federated query
#[derive(Debug, Clone)]
pub struct FederationPlan {
    /// Source tables to fetch, in query appearance order
    pub sources: Vec<SourceFetchPlan>,
    /// Rewritten SQL with local temp table names
    pub engine_query: String,
}

/// Default row cap per source table
pub const DEFAULT_ROW_LIMIT: u64 = 100_000;

/// Deadline for a single source fetch
pub const SOURCE_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for the whole pipeline, parse to results
pub const GLOBAL_TIMEOUT: Duration = Duration::from_secs(60);
