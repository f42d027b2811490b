// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL backend
//!
//! Implements the `Backend` trait using SQLx. The pool is small and
//! read-only-biased: every pooled connection sets
//! `default_transaction_read_only` on acquisition, since the gateway only
//! ever reads from registered backends.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Executor, Row as SqlxRow};

use crate::engine::drivers::{effective_url, redact_url};
use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::traits::{Backend, Connector};
use crate::engine::types::{
    AddDatasourceRequest, ColumnDescriptor, ColumnInfo, Row, Value,
};

const POOL_MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub struct PostgresConnector;

#[async_trait]
impl Connector for PostgresConnector {
    fn schemes(&self) -> &'static [&'static str] {
        &["postgres", "postgresql"]
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn connect(&self, request: &AddDatasourceRequest) -> GatewayResult<Arc<dyn Backend>> {
        let conn_str = effective_url(request)?;

        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .after_connect(|conn, _meta| {
                Box::pin(async move {
                    conn.execute("SET default_transaction_read_only = on").await?;
                    Ok(())
                })
            })
            .connect(&conn_str)
            .await
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("password authentication failed") {
                    GatewayError::connectivity(format!("Authentication failed: {msg}"))
                } else {
                    GatewayError::connectivity(msg)
                }
            })?;

        Ok(Arc::new(PostgresBackend {
            pool,
            target: redact_url(&request.url),
        }))
    }
}

pub struct PostgresBackend {
    pool: PgPool,
    target: Option<String>,
}

impl PostgresBackend {
    /// Quotes an identifier for interpolation into reflection SQL.
    fn quote_ident(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Converts a SQLx row to the universal Row type
    fn convert_row(pg_row: &PgRow) -> Row {
        let values: Vec<Value> = pg_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(pg_row, col.ordinal()))
            .collect();
        Row { values }
    }

    /// Extracts a value at the given index, trying common types in order.
    /// `try_get` with `Option<T>` handles NULLs gracefully.
    fn extract_value(row: &PgRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i16>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<bool>, _>(idx) {
            return v.map(Value::Bool).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f64>, _>(idx) {
            return v.map(Value::Float).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<f32>, _>(idx) {
            return v.map(|f| Value::Float(f as f64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<rust_decimal::Decimal>, _>(idx) {
            use rust_decimal::prelude::ToPrimitive;
            return v
                .and_then(|d| d.to_f64())
                .map(Value::Float)
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<String>, _>(idx) {
            return v.map(Value::Text).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(idx) {
            return v.map(Value::Bytes).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<serde_json::Value>, _>(idx) {
            return v.map(Value::Json).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<uuid::Uuid>, _>(idx) {
            return v.map(|u| Value::Text(u.to_string())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(idx) {
            return v.map(|dt| Value::Text(dt.to_rfc3339())).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(idx) {
            return v
                .map(|dt| Value::Text(dt.format("%Y-%m-%d %H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(idx) {
            return v
                .map(|d| Value::Text(d.format("%Y-%m-%d").to_string()))
                .unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<chrono::NaiveTime>, _>(idx) {
            return v
                .map(|t| Value::Text(t.format("%H:%M:%S").to_string()))
                .unwrap_or(Value::Null);
        }

        Value::Null
    }

    fn get_column_info(row: &PgRow) -> Vec<ColumnInfo> {
        use sqlx::TypeInfo;
        row.columns()
            .iter()
            .map(|col| ColumnInfo {
                name: col.name().to_string(),
                data_type: col.type_info().name().to_string(),
                nullable: true,
            })
            .collect()
    }
}

#[async_trait]
impl Backend for PostgresBackend {
    fn backend_type(&self) -> &'static str {
        "postgres"
    }

    fn connection_target(&self) -> Option<String> {
        self.target.clone()
    }

    async fn probe(&self) -> GatewayResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        Ok(())
    }

    async fn product_name(&self) -> GatewayResult<String> {
        let version: (String,) = sqlx::query_as("SELECT current_setting('server_version')")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        Ok(format!("PostgreSQL {}", version.0))
    }

    async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT nspname
            FROM pg_catalog.pg_namespace
            WHERE nspname NOT IN ('information_schema', 'pg_catalog', 'pg_toast')
              AND nspname NOT LIKE 'pg_temp_%'
              AND nspname NOT LIKE 'pg_toast_temp_%'
            ORDER BY nspname
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::introspection(e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_tables(&self, schema: Option<&str>) -> GatewayResult<Vec<String>> {
        let schema = schema.unwrap_or("public");
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = $1
              AND table_type IN ('BASE TABLE', 'VIEW')
            ORDER BY table_name
            "#,
        )
        .bind(schema)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::introspection(e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> GatewayResult<Vec<ColumnDescriptor>> {
        let schema = schema.unwrap_or("public");

        let pk_rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT kcu.column_name
            FROM information_schema.table_constraints tc
            JOIN information_schema.key_column_usage kcu
              ON tc.constraint_name = kcu.constraint_name
             AND tc.table_schema = kcu.table_schema
            WHERE tc.table_schema = $1
              AND tc.table_name = $2
              AND tc.constraint_type = 'PRIMARY KEY'
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::introspection(e.to_string()))?;
        let primary_keys: Vec<String> = pk_rows.into_iter().map(|(name,)| name).collect();

        let rows: Vec<(String, String, String, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT column_name, data_type, is_nullable, column_default, is_identity
            FROM information_schema.columns
            WHERE table_schema = $1 AND table_name = $2
            ORDER BY ordinal_position
            "#,
        )
        .bind(schema)
        .bind(table)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::introspection(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default_value, is_identity)| {
                let is_auto_increment = is_identity == "YES"
                    || default_value
                        .as_deref()
                        .map(|d| d.starts_with("nextval("))
                        .unwrap_or(false);
                ColumnDescriptor {
                    is_primary_key: primary_keys.contains(&name),
                    is_auto_increment,
                    nullable: is_nullable == "YES",
                    name,
                    data_type,
                    default_value,
                    constraints: Vec::new(),
                }
            })
            .collect())
    }

    async fn fetch_table(
        &self,
        schema: Option<&str>,
        table: &str,
        row_limit: u64,
    ) -> GatewayResult<(Vec<ColumnInfo>, Vec<Row>)> {
        let schema = schema.unwrap_or("public");
        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {row_limit}",
            Self::quote_ident(schema),
            Self::quote_ident(table)
        );

        let pg_rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::query_execution(e.to_string()))?;

        let columns = match pg_rows.first() {
            Some(first) => Self::get_column_info(first),
            // Empty tables still need a shape for the federation engine
            None => self
                .table_columns(Some(schema), table)
                .await?
                .into_iter()
                .map(|c| ColumnInfo {
                    name: c.name,
                    data_type: c.data_type,
                    nullable: c.nullable,
                })
                .collect(),
        };
        let rows = pg_rows.iter().map(Self::convert_row).collect();

        Ok((columns, rows))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_ident_escapes_embedded_quotes() {
        assert_eq!(PostgresBackend::quote_ident("users"), "\"users\"");
        assert_eq!(PostgresBackend::quote_ident("we\"ird"), "\"we\"\"ird\"");
    }
}
