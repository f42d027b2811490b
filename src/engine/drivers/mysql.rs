// SPDX-License-Identifier: Apache-2.0

//! MySQL backend
//!
//! Implements the `Backend` trait using SQLx. MySQL databases act as the
//! native sub-schemas; the well-known system databases are excluded at this
//! level.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row as SqlxRow};

use crate::engine::drivers::{effective_url, redact_url};
use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::traits::{Backend, Connector};
use crate::engine::types::{
    AddDatasourceRequest, ColumnDescriptor, ColumnInfo, Row, Value,
};

const POOL_MAX_CONNECTIONS: u32 = 5;
const ACQUIRE_TIMEOUT_SECS: u64 = 10;

pub struct MySqlConnector;

#[async_trait]
impl Connector for MySqlConnector {
    fn schemes(&self) -> &'static [&'static str] {
        &["mysql"]
    }

    fn display_name(&self) -> &'static str {
        "MySQL"
    }

    async fn connect(&self, request: &AddDatasourceRequest) -> GatewayResult<Arc<dyn Backend>> {
        let conn_str = effective_url(request)?;

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_secs(ACQUIRE_TIMEOUT_SECS))
            .connect(&conn_str)
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;

        Ok(Arc::new(MySqlBackend {
            pool,
            target: redact_url(&request.url),
        }))
    }
}

pub struct MySqlBackend {
    pool: MySqlPool,
    target: Option<String>,
}

impl MySqlBackend {
    fn quote_ident(ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn convert_row(my_row: &MySqlRow) -> Row {
        let values: Vec<Value> = my_row
            .columns()
            .iter()
            .map(|col| Self::extract_value(my_row, col.ordinal()))
            .collect();
        Row { values }
    }

    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        if let Ok(v) = row.try_get::<Option<i64>, _>(idx) {
            return v.map(Value::Int).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<i32>, _>(idx) {
            return v.map(|i| Value::Int(i as i64)).unwrap_or(Value::Null);
        }
        if let Ok(v) = row.try_get::<Option<u64>, _>(idx) {
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

    fn get_column_info(row: &MySqlRow) -> Vec<ColumnInfo> {
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
impl Backend for MySqlBackend {
    fn backend_type(&self) -> &'static str {
        "mysql"
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
        let version: (String,) = sqlx::query_as("SELECT version()")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        Ok(format!("MySQL {}", version.0))
    }

    async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT schema_name
            FROM information_schema.schemata
            WHERE schema_name NOT IN ('information_schema', 'mysql', 'performance_schema', 'sys')
            ORDER BY schema_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| GatewayError::introspection(e.to_string()))?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn list_tables(&self, schema: Option<&str>) -> GatewayResult<Vec<String>> {
        let Some(schema) = schema else {
            return Err(GatewayError::introspection(
                "MySQL requires a schema for table listing",
            ));
        };

        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT table_name
            FROM information_schema.tables
            WHERE table_schema = ?
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
        let Some(schema) = schema else {
            return Err(GatewayError::introspection(
                "MySQL requires a schema for column reflection",
            ));
        };

        let rows: Vec<(String, String, String, Option<String>, String, String)> = sqlx::query_as(
            r#"
            SELECT column_name, data_type, is_nullable, column_default, column_key, extra
            FROM information_schema.columns
            WHERE table_schema = ? AND table_name = ?
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
            .map(|(name, data_type, is_nullable, default_value, column_key, extra)| {
                ColumnDescriptor {
                    name,
                    data_type,
                    nullable: is_nullable == "YES",
                    default_value,
                    is_primary_key: column_key == "PRI",
                    is_auto_increment: extra.to_lowercase().contains("auto_increment"),
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
        let Some(schema) = schema else {
            return Err(GatewayError::query_execution(
                "MySQL requires a schema for table fetch",
            ));
        };

        let sql = format!(
            "SELECT * FROM {}.{} LIMIT {row_limit}",
            Self::quote_ident(schema),
            Self::quote_ident(table)
        );

        let my_rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| GatewayError::query_execution(e.to_string()))?;

        let columns = match my_rows.first() {
            Some(first) => Self::get_column_info(first),
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
        let rows = my_rows.iter().map(Self::convert_row).collect();

        Ok((columns, rows))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
