// SPDX-License-Identifier: Apache-2.0

//! Federated query execution
//!
//! Orchestrates the pipeline: plan → fetch sources in parallel → load into
//! the in-memory engine → execute → assemble results. Reported execution
//! time covers everything after planning; `EXPLAIN` requests run against
//! schema-only temp tables and always report zero.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::timeout;
use tracing::{info, instrument};

use crate::catalog::{FederationCatalog, ResolvedTable};
use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::registry::DatasourceRegistry;
use crate::engine::types::{ColumnInfo, QueryId, QueryResult, Row};

use super::engine::DuckDbEngine;
use super::parser::strip_explain;
use super::planner::build_plan;
use super::types::{FederationPlan, GLOBAL_TIMEOUT, SOURCE_FETCH_TIMEOUT};

/// Executes a query across the registered datasources.
#[instrument(skip_all, fields(query_len = sql.len()))]
pub async fn execute_query(
    sql: &str,
    registry: &Arc<DatasourceRegistry>,
    catalog: &Arc<FederationCatalog>,
) -> GatewayResult<QueryResult> {
    let result = timeout(GLOBAL_TIMEOUT, execute_inner(sql, registry, catalog)).await;
    match result {
        Ok(inner) => inner,
        Err(_) => Err(GatewayError::Timeout {
            timeout_ms: GLOBAL_TIMEOUT.as_millis() as u64,
        }),
    }
}

async fn execute_inner(
    sql: &str,
    registry: &Arc<DatasourceRegistry>,
    catalog: &Arc<FederationCatalog>,
) -> GatewayResult<QueryResult> {
    let query_id = QueryId::new();
    let names: HashSet<String> = registry.names().await.into_iter().collect();

    if let Some(inner_sql) = strip_explain(sql) {
        return explain(sql, inner_sql, &names, catalog, query_id);
    }

    let plan = build_plan(sql, &names, catalog)?;

    // Timing starts after planning so parse cost never counts
    let started = Instant::now();

    let fetched = fetch_all_sources(&plan, registry).await?;

    // DuckDB connections are not Send, so the engine only exists after all
    // awaits are done
    let engine = DuckDbEngine::new()?;
    for (source, (columns, rows)) in plan.sources.iter().zip(fetched.iter()) {
        engine.create_temp_table(&source.table_ref.local_alias, columns)?;
        engine.insert_batch(&source.table_ref.local_alias, rows, columns)?;
    }

    let (columns, rows) = engine.execute_query(&plan.engine_query)?;
    let execution_time_ms = started.elapsed().as_millis() as u64;

    info!(
        query_id = %query_id.0,
        sources = plan.sources.len(),
        rows = rows.len(),
        execution_time_ms,
        "federated query completed"
    );

    Ok(QueryResult::from_parts(columns, rows, execution_time_ms))
}

/// Runs an `EXPLAIN` against empty temp tables shaped from catalog
/// metadata. Falls back to passing the text through verbatim when the
/// inner statement is not parseable here, and keeps only the first plan
/// row either way.
fn explain(
    full_sql: &str,
    inner_sql: &str,
    names: &HashSet<String>,
    catalog: &Arc<FederationCatalog>,
    query_id: QueryId,
) -> GatewayResult<QueryResult> {
    let engine = DuckDbEngine::new()?;

    let engine_sql = match build_plan(inner_sql, names, catalog) {
        Ok(plan) => {
            for source in &plan.sources {
                let resolved = ResolvedTable {
                    datasource: source.table_ref.datasource.clone(),
                    schema: source.table_ref.schema.clone(),
                    table: source.table_ref.table.clone(),
                };
                let columns: Vec<ColumnInfo> = catalog
                    .table_columns(&resolved)
                    .into_iter()
                    .map(|c| ColumnInfo {
                        name: c.name,
                        data_type: c.data_type,
                        nullable: c.nullable,
                    })
                    .collect();
                if !columns.is_empty() {
                    engine.create_temp_table(&source.table_ref.local_alias, &columns)?;
                }
            }
            format!("EXPLAIN {}", plan.engine_query)
        }
        Err(GatewayError::QueryParse { .. }) => full_sql.trim().to_string(),
        Err(other) => return Err(other),
    };

    let (columns, mut rows) = engine.execute_query(&engine_sql)?;
    rows.truncate(1);

    info!(query_id = %query_id.0, "explain completed");

    Ok(QueryResult::from_parts(columns, rows, 0))
}

/// Fetches every source table in parallel. Any failure fails the query,
/// naming the source that broke.
async fn fetch_all_sources(
    plan: &FederationPlan,
    registry: &Arc<DatasourceRegistry>,
) -> GatewayResult<Vec<(Vec<ColumnInfo>, Vec<Row>)>> {
    let mut handles = Vec::with_capacity(plan.sources.len());

    for source in &plan.sources {
        let registry = Arc::clone(registry);
        let source = source.clone();

        handles.push(tokio::spawn(async move {
            let backend = registry.get(&source.table_ref.datasource).await?;
            timeout(
                SOURCE_FETCH_TIMEOUT,
                backend.fetch_table(
                    source.table_ref.schema.as_deref(),
                    &source.table_ref.table,
                    source.row_limit,
                ),
            )
            .await
            .map_err(|_| GatewayError::Timeout {
                timeout_ms: SOURCE_FETCH_TIMEOUT.as_millis() as u64,
            })?
        }));
    }

    let mut fetched = Vec::with_capacity(handles.len());
    let mut failure = None;
    for (i, handle) in handles.into_iter().enumerate() {
        if failure.is_some() {
            // The query already failed; stop the sibling fetches instead of
            // letting them run detached
            handle.abort();
            continue;
        }
        match handle.await {
            Ok(Ok(result)) => fetched.push(result),
            Ok(Err(e)) => {
                let source = &plan.sources[i];
                failure = Some(GatewayError::query_execution(format!(
                    "failed to fetch from '{}': {e}",
                    source.table_ref.dotted_name()
                )));
            }
            Err(e) => {
                failure = Some(GatewayError::internal(format!(
                    "source fetch task panicked: {e}"
                )));
            }
        }
    }

    match failure {
        Some(err) => Err(err),
        None => Ok(fetched),
    }
}
