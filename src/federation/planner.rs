// SPDX-License-Identifier: Apache-2.0

//! Federated query planning
//!
//! Turns a parsed query into an execution plan: every qualified reference
//! is resolved against the catalog, assigned a temp table alias, and the
//! query is rewritten for the local execution engine.

use std::collections::{HashMap, HashSet};

use crate::catalog::FederationCatalog;
use crate::engine::error::{GatewayError, GatewayResult};

use super::parser::{extract_table_refs, rewrite_query};
use super::types::{FederationPlan, SourceFetchPlan, TableRef, DEFAULT_ROW_LIMIT};

fn ref_parts(table_ref: &TableRef) -> Vec<String> {
    match &table_ref.schema {
        Some(schema) => vec![
            table_ref.datasource.clone(),
            schema.clone(),
            table_ref.table.clone(),
        ],
        None => vec![table_ref.datasource.clone(), table_ref.table.clone()],
    }
}

/// Builds the execution plan for a submitted query.
///
/// References whose first segment names a registered datasource but which
/// do not resolve to a catalog table fail planning; anything else is left
/// for the execution engine to judge.
pub fn build_plan(
    sql: &str,
    datasource_names: &HashSet<String>,
    catalog: &FederationCatalog,
) -> GatewayResult<FederationPlan> {
    let refs = extract_table_refs(sql, datasource_names)?;

    for table_ref in &refs {
        if catalog.resolve(&ref_parts(table_ref)).is_none() {
            return Err(GatewayError::query_execution(format!(
                "unknown table '{}'",
                table_ref.dotted_name()
            )));
        }
    }

    let mappings: HashMap<String, String> = refs
        .iter()
        .map(|r| (r.dotted_name(), r.local_alias.clone()))
        .collect();

    let engine_query = if mappings.is_empty() {
        sql.trim().to_string()
    } else {
        rewrite_query(sql, &mappings)?
    };

    Ok(FederationPlan {
        sources: refs
            .into_iter()
            .map(|table_ref| SourceFetchPlan {
                table_ref,
                row_limit: DEFAULT_ROW_LIMIT,
            })
            .collect(),
        engine_query,
    })
}
