// SPDX-License-Identifier: Apache-2.0

//! Federated query parsing and rewriting
//!
//! Finds qualified table references (`datasource.schema.table` for
//! multi-schema backends, `datasource.table` for flat ones) in a submitted
//! SQL statement and rewrites them to local temp table names for the
//! execution engine. Only the first name segment decides whether a
//! reference is federated: it must match a registered datasource name.

use std::collections::{HashMap, HashSet};

use sqlparser::ast::{
    Expr, FunctionArguments, ObjectNamePart, OrderByKind, Query, Select, SelectItem, SetExpr,
    Statement, TableFactor, TableWithJoins,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::engine::error::{GatewayError, GatewayResult};

use super::types::TableRef;

fn part_value(part: &ObjectNamePart) -> String {
    match part {
        ObjectNamePart::Identifier(ident) => ident.value.clone(),
        _ => String::new(),
    }
}

fn name_parts(name: &sqlparser::ast::ObjectName) -> Vec<String> {
    name.0.iter().map(part_value).collect()
}

/// Returns the statement following an `EXPLAIN` keyword, if present
pub fn strip_explain(sql: &str) -> Option<&str> {
    let trimmed = sql.trim_start();
    let rest = trimmed
        .get(.."EXPLAIN".len())
        .filter(|head| head.eq_ignore_ascii_case("EXPLAIN"))
        .map(|head| &trimmed[head.len()..])?;
    if rest.starts_with(char::is_whitespace) {
        Some(rest.trim_start())
    } else {
        None
    }
}

fn parse_single_select(sql: &str) -> GatewayResult<Statement> {
    let statements = Parser::parse_sql(&GenericDialect {}, sql.trim())
        .map_err(|e| GatewayError::query_parse(sql, e.to_string()))?;

    if statements.len() != 1 {
        return Err(GatewayError::query_parse(
            sql,
            "queries must be a single statement",
        ));
    }

    let statement = statements.into_iter().next().ok_or_else(|| {
        GatewayError::query_parse(sql, "empty statement")
    })?;

    if !matches!(statement, Statement::Query(_)) {
        return Err(GatewayError::query_parse(
            sql,
            "only SELECT statements are supported",
        ));
    }

    Ok(statement)
}

/// Extracts every federated table reference from a query.
///
/// A query with no qualified references is valid: it runs on the execution
/// engine alone (e.g. `SELECT 1`).
pub fn extract_table_refs(
    sql: &str,
    datasource_names: &HashSet<String>,
) -> GatewayResult<Vec<TableRef>> {
    let statement = parse_single_select(sql)?;

    let mut raw_refs = Vec::new();
    if let Statement::Query(query) = &statement {
        collect_query_refs(query, &mut raw_refs);
    }

    let mut refs: Vec<TableRef> = Vec::new();
    let mut counter = 0u32;
    for parts in raw_refs {
        if !datasource_names.contains(&parts[0]) {
            continue;
        }
        let (schema, table) = match parts.len() {
            2 => (None, parts[1].clone()),
            3 => (Some(parts[1].clone()), parts[2].clone()),
            _ => continue,
        };

        let candidate = TableRef {
            datasource: parts[0].clone(),
            schema,
            table: table.clone(),
            local_alias: String::new(),
        };
        // The same table referenced twice maps to one temp table
        if refs
            .iter()
            .any(|r| r.datasource == candidate.datasource && r.schema == candidate.schema && r.table == candidate.table)
        {
            continue;
        }

        let local_alias = format!("__fed_{}_{}", sanitize_identifier(&table), counter);
        counter += 1;
        refs.push(TableRef {
            local_alias,
            ..candidate
        });
    }

    Ok(refs)
}

/// Rewrites qualified references to their local aliases.
///
/// `mappings` maps the dotted name as written (e.g. `pg1.public.users`) to
/// the temp table name.
pub fn rewrite_query(sql: &str, mappings: &HashMap<String, String>) -> GatewayResult<String> {
    let mut statement = parse_single_select(sql)?;
    if let Statement::Query(query) = &mut statement {
        rewrite_query_ast(query, mappings);
    }
    Ok(statement.to_string())
}

// --- AST walking ---

fn collect_query_refs(query: &Query, refs: &mut Vec<Vec<String>>) {
    collect_set_expr_refs(&query.body, refs);
    if let Some(ref with) = query.with {
        for cte in &with.cte_tables {
            collect_query_refs(&cte.query, refs);
        }
    }
}

fn collect_set_expr_refs(set_expr: &SetExpr, refs: &mut Vec<Vec<String>>) {
    match set_expr {
        SetExpr::Select(select) => collect_select_refs(select, refs),
        SetExpr::Query(query) => collect_query_refs(query, refs),
        SetExpr::SetOperation { left, right, .. } => {
            collect_set_expr_refs(left, refs);
            collect_set_expr_refs(right, refs);
        }
        _ => {}
    }
}

fn collect_select_refs(select: &Select, refs: &mut Vec<Vec<String>>) {
    for twj in &select.from {
        collect_table_factor_refs(&twj.relation, refs);
        for join in &twj.joins {
            collect_table_factor_refs(&join.relation, refs);
        }
    }
}

fn collect_table_factor_refs(factor: &TableFactor, refs: &mut Vec<Vec<String>>) {
    match factor {
        TableFactor::Table { name, .. } => {
            let parts = name_parts(name);
            if parts.len() >= 2 {
                refs.push(parts);
            }
        }
        TableFactor::Derived { subquery, .. } => {
            collect_query_refs(subquery, refs);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            collect_table_factor_refs(&table_with_joins.relation, refs);
            for join in &table_with_joins.joins {
                collect_table_factor_refs(&join.relation, refs);
            }
        }
        _ => {}
    }
}

fn rewrite_query_ast(query: &mut Query, mappings: &HashMap<String, String>) {
    rewrite_set_expr(&mut query.body, mappings);

    if let Some(ref mut with) = query.with {
        for cte in &mut with.cte_tables {
            rewrite_query_ast(&mut cte.query, mappings);
        }
    }

    if let Some(ref mut order_by) = query.order_by {
        if let OrderByKind::Expressions(ref mut exprs) = order_by.kind {
            for expr_with_alias in exprs {
                rewrite_expr(&mut expr_with_alias.expr, mappings);
            }
        }
    }
}

fn rewrite_set_expr(set_expr: &mut SetExpr, mappings: &HashMap<String, String>) {
    match set_expr {
        SetExpr::Select(select) => rewrite_select(select, mappings),
        SetExpr::Query(query) => rewrite_query_ast(query, mappings),
        SetExpr::SetOperation { left, right, .. } => {
            rewrite_set_expr(left, mappings);
            rewrite_set_expr(right, mappings);
        }
        _ => {}
    }
}

fn rewrite_select(select: &mut Select, mappings: &HashMap<String, String>) {
    for table_with_joins in &mut select.from {
        rewrite_table_with_joins(table_with_joins, mappings);
    }

    for item in &mut select.projection {
        if let SelectItem::UnnamedExpr(expr) | SelectItem::ExprWithAlias { expr, .. } = item {
            rewrite_expr(expr, mappings);
        }
    }

    if let Some(ref mut selection) = select.selection {
        rewrite_expr(selection, mappings);
    }

    if let sqlparser::ast::GroupByExpr::Expressions(ref mut exprs, _) = select.group_by {
        for expr in exprs {
            rewrite_expr(expr, mappings);
        }
    }

    if let Some(ref mut having) = select.having {
        rewrite_expr(having, mappings);
    }
}

fn rewrite_table_with_joins(twj: &mut TableWithJoins, mappings: &HashMap<String, String>) {
    rewrite_table_factor(&mut twj.relation, mappings);
    for join in &mut twj.joins {
        rewrite_table_factor(&mut join.relation, mappings);
        match &mut join.join_operator {
            sqlparser::ast::JoinOperator::Inner(constraint)
            | sqlparser::ast::JoinOperator::LeftOuter(constraint)
            | sqlparser::ast::JoinOperator::RightOuter(constraint)
            | sqlparser::ast::JoinOperator::FullOuter(constraint) => {
                if let sqlparser::ast::JoinConstraint::On(ref mut expr) = constraint {
                    rewrite_expr(expr, mappings);
                }
            }
            _ => {}
        }
    }
}

fn rewrite_table_factor(factor: &mut TableFactor, mappings: &HashMap<String, String>) {
    match factor {
        TableFactor::Table { name, .. } => {
            let parts = name_parts(name);
            if parts.len() >= 2 {
                let dotted = parts.join(".");
                if let Some(local_alias) = mappings.get(&dotted) {
                    name.0 = vec![ObjectNamePart::Identifier(sqlparser::ast::Ident::new(
                        local_alias.clone(),
                    ))];
                }
            }
        }
        TableFactor::Derived { subquery, .. } => {
            rewrite_query_ast(subquery, mappings);
        }
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => {
            rewrite_table_with_joins(table_with_joins, mappings);
        }
        _ => {}
    }
}

/// Replaces a qualified-name prefix of a compound identifier, e.g.
/// `pg1.public.users.email` → `__fed_users_0.email`. Longer prefixes win
/// so a three-part table name is never mistaken for a two-part one.
fn rewrite_compound_prefix(
    idents: &mut Vec<sqlparser::ast::Ident>,
    mappings: &HashMap<String, String>,
) {
    for prefix_len in [3usize, 2] {
        if idents.len() <= prefix_len {
            continue;
        }
        let dotted = idents[..prefix_len]
            .iter()
            .map(|i| i.value.clone())
            .collect::<Vec<_>>()
            .join(".");
        if let Some(local_alias) = mappings.get(&dotted) {
            let mut new_idents = vec![sqlparser::ast::Ident::new(local_alias.clone())];
            new_idents.extend(idents[prefix_len..].iter().cloned());
            *idents = new_idents;
            return;
        }
    }
}

fn rewrite_expr(expr: &mut Expr, mappings: &HashMap<String, String>) {
    match expr {
        Expr::CompoundIdentifier(idents) => {
            rewrite_compound_prefix(idents, mappings);
        }
        Expr::BinaryOp { left, right, .. } => {
            rewrite_expr(left, mappings);
            rewrite_expr(right, mappings);
        }
        Expr::UnaryOp { expr: inner, .. } => {
            rewrite_expr(inner, mappings);
        }
        Expr::Nested(inner) => {
            rewrite_expr(inner, mappings);
        }
        Expr::Function(func) => {
            if let FunctionArguments::List(ref mut arg_list) = func.args {
                for arg in &mut arg_list.args {
                    if let sqlparser::ast::FunctionArg::Unnamed(
                        sqlparser::ast::FunctionArgExpr::Expr(ref mut e),
                    ) = arg
                    {
                        rewrite_expr(e, mappings);
                    }
                }
            }
        }
        Expr::Cast { expr: inner, .. } => {
            rewrite_expr(inner, mappings);
        }
        Expr::IsNull(inner) | Expr::IsNotNull(inner) | Expr::IsTrue(inner) | Expr::IsFalse(inner) => {
            rewrite_expr(inner, mappings);
        }
        Expr::Between {
            expr: inner,
            low,
            high,
            ..
        } => {
            rewrite_expr(inner, mappings);
            rewrite_expr(low, mappings);
            rewrite_expr(high, mappings);
        }
        Expr::InList {
            expr: inner, list, ..
        } => {
            rewrite_expr(inner, mappings);
            for item in list {
                rewrite_expr(item, mappings);
            }
        }
        Expr::InSubquery {
            expr: inner,
            subquery,
            ..
        } => {
            rewrite_expr(inner, mappings);
            rewrite_query_ast(subquery, mappings);
        }
        Expr::Subquery(subquery) => {
            rewrite_query_ast(subquery, mappings);
        }
        Expr::Case {
            operand,
            conditions,
            else_result,
            ..
        } => {
            if let Some(op) = operand {
                rewrite_expr(op, mappings);
            }
            for case_when in conditions {
                rewrite_expr(&mut case_when.condition, mappings);
                rewrite_expr(&mut case_when.result, mappings);
            }
            if let Some(else_r) = else_result {
                rewrite_expr(else_r, mappings);
            }
        }
        Expr::Like {
            expr: inner,
            pattern,
            ..
        }
        | Expr::ILike {
            expr: inner,
            pattern,
            ..
        } => {
            rewrite_expr(inner, mappings);
            rewrite_expr(pattern, mappings);
        }
        _ => {}
    }
}

fn sanitize_identifier(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names() -> HashSet<String> {
        ["pg1", "mongo1"].iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn strip_explain_is_case_insensitive() {
        assert_eq!(strip_explain("EXPLAIN SELECT 1"), Some("SELECT 1"));
        assert_eq!(strip_explain("  explain\n select 1"), Some("select 1"));
        assert_eq!(strip_explain("SELECT 1"), None);
        assert_eq!(strip_explain("EXPLAINX SELECT 1"), None);
    }

    #[test]
    fn finds_three_part_and_two_part_refs() {
        let sql = "SELECT u.email, e.kind FROM pg1.public.users u \
                   JOIN mongo1.events e ON e.user_id = u.id";
        let refs = extract_table_refs(sql, &names()).unwrap();
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].datasource, "pg1");
        assert_eq!(refs[0].schema.as_deref(), Some("public"));
        assert_eq!(refs[0].table, "users");
        assert_eq!(refs[0].local_alias, "__fed_users_0");
        assert_eq!(refs[1].datasource, "mongo1");
        assert_eq!(refs[1].schema, None);
        assert_eq!(refs[1].table, "events");
    }

    #[test]
    fn unqualified_query_yields_no_refs() {
        let refs = extract_table_refs("SELECT 1 AS test_value", &names()).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn unknown_first_segment_is_not_federated() {
        let refs = extract_table_refs("SELECT * FROM other.users", &names()).unwrap();
        assert!(refs.is_empty());
    }

    #[test]
    fn repeated_reference_maps_once() {
        let sql = "SELECT * FROM pg1.public.users a JOIN pg1.public.users b ON a.id = b.id";
        let refs = extract_table_refs(sql, &names()).unwrap();
        assert_eq!(refs.len(), 1);
    }

    #[test]
    fn rejects_mutations_and_multi_statements() {
        let err = extract_table_refs("DELETE FROM pg1.public.users", &names()).unwrap_err();
        assert!(matches!(err, GatewayError::QueryParse { .. }));

        let err = extract_table_refs("SELECT 1; SELECT 2", &names()).unwrap_err();
        assert!(matches!(err, GatewayError::QueryParse { .. }));
    }

    #[test]
    fn parse_failure_names_the_query() {
        let err = extract_table_refs("SELEKT oops", &names()).unwrap_err();
        match err {
            GatewayError::QueryParse { query, .. } => assert!(query.contains("SELEKT")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn rewrite_replaces_tables_and_column_prefixes() {
        let sql = "SELECT pg1.public.users.email FROM pg1.public.users \
                   JOIN mongo1.events ON mongo1.events.user_id = pg1.public.users.id";
        let refs = extract_table_refs(sql, &names()).unwrap();

        let mappings: HashMap<String, String> = refs
            .iter()
            .map(|r| (r.dotted_name(), r.local_alias.clone()))
            .collect();

        let rewritten = rewrite_query(sql, &mappings).unwrap();
        assert!(rewritten.contains("__fed_users_0"));
        assert!(rewritten.contains("__fed_events_1"));
        assert!(!rewritten.contains("pg1"));
        assert!(!rewritten.contains("mongo1"));
    }
}
