// SPDX-License-Identifier: Apache-2.0

//! In-memory execution engine
//!
//! Each query gets a fresh in-memory DuckDB connection: source data is
//! loaded into temp tables, the rewritten query runs, and dropping the
//! connection frees everything. `Connection` is not `Send`, so all engine
//! calls are synchronous and sources must be fetched before it is created.

use duckdb::{params_from_iter, types::Value as DuckValue, Connection};

use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::types::{ColumnInfo, Row, Value};

/// Rows per insert transaction
const INSERT_BATCH_SIZE: usize = 1000;

pub struct DuckDbEngine {
    conn: Connection,
}

impl DuckDbEngine {
    pub fn new() -> GatewayResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| GatewayError::internal(format!("failed to open DuckDB: {e}")))?;
        Ok(Self { conn })
    }

    /// Creates a temp table with the given shape.
    pub fn create_temp_table(&self, name: &str, columns: &[ColumnInfo]) -> GatewayResult<()> {
        if columns.is_empty() {
            return Err(GatewayError::query_execution(format!(
                "cannot create temp table '{name}': no columns"
            )));
        }

        let col_defs: Vec<String> = columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, map_type_to_duckdb(&c.data_type)))
            .collect();

        let sql = format!("CREATE TEMP TABLE \"{}\" ({})", name, col_defs.join(", "));

        self.conn.execute_batch(&sql).map_err(|e| {
            GatewayError::query_execution(format!("failed to create temp table '{name}': {e}"))
        })?;

        Ok(())
    }

    /// Inserts rows into a temp table in batches
    pub fn insert_batch(
        &self,
        table: &str,
        rows: &[Row],
        columns: &[ColumnInfo],
    ) -> GatewayResult<()> {
        if rows.is_empty() || columns.is_empty() {
            return Ok(());
        }

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "INSERT INTO \"{}\" VALUES ({})",
            table,
            placeholders.join(", ")
        );

        for chunk in rows.chunks(INSERT_BATCH_SIZE) {
            let tx = self
                .conn
                .unchecked_transaction()
                .map_err(|e| GatewayError::internal(format!("DuckDB transaction failed: {e}")))?;

            {
                let mut stmt = tx
                    .prepare_cached(&sql)
                    .map_err(|e| GatewayError::internal(format!("DuckDB prepare failed: {e}")))?;

                for row in chunk {
                    let duck_values: Vec<DuckValue> =
                        row.values.iter().map(value_to_duckdb).collect();

                    stmt.execute(params_from_iter(duck_values.iter()))
                        .map_err(|e| {
                            GatewayError::internal(format!("DuckDB insert failed: {e}"))
                        })?;
                }
            }

            tx.commit()
                .map_err(|e| GatewayError::internal(format!("DuckDB commit failed: {e}")))?;
        }

        Ok(())
    }

    /// Executes a query and collects the full result set.
    pub fn execute_query(&self, sql: &str) -> GatewayResult<(Vec<ColumnInfo>, Vec<Row>)> {
        let mut stmt = self
            .conn
            .prepare(sql)
            .map_err(|e| GatewayError::query_execution(format!("federated query failed: {e}")))?;

        let column_count = stmt.column_count();
        let columns: Vec<ColumnInfo> = (0..column_count)
            .map(|i| ColumnInfo {
                name: stmt
                    .column_name(i)
                    .map(|s| s.to_string())
                    .unwrap_or_else(|_| "?".to_string()),
                data_type: "VARCHAR".to_string(), // types are normalized at output
                nullable: true,
            })
            .collect();

        let rows_iter = stmt
            .query_map([], |row| {
                let values: Vec<Value> =
                    (0..column_count).map(|i| extract_duckdb_value(row, i)).collect();
                Ok(Row { values })
            })
            .map_err(|e| GatewayError::query_execution(format!("federated query failed: {e}")))?;

        let mut rows = Vec::new();
        for row_result in rows_iter {
            let row = row_result
                .map_err(|e| GatewayError::query_execution(format!("row fetch failed: {e}")))?;
            rows.push(row);
        }

        Ok((columns, rows))
    }
}

/// Maps a source type name (relational or document) to a DuckDB type
fn map_type_to_duckdb(data_type: &str) -> &'static str {
    let lower = data_type.to_lowercase();
    let normalized = lower.trim();

    if normalized.ends_with("[]") || normalized.starts_with("array") {
        return "VARCHAR"; // arrays travel as JSON strings
    }

    match normalized {
        "boolean" | "bool" => "BOOLEAN",

        "smallint" | "int2" | "smallserial" | "serial2" | "tinyint" => "SMALLINT",
        "integer" | "int" | "int4" | "serial" | "serial4" | "mediumint" => "INTEGER",
        "bigint" | "int8" | "bigserial" | "serial8" | "long" => "BIGINT",

        "real" | "float4" | "float" => "FLOAT",
        "double precision" | "double" | "float8" => "DOUBLE",
        "numeric" | "decimal" | "money" => "DOUBLE",

        "text" | "character varying" | "varchar" | "char" | "character" | "bpchar" | "citext"
        | "name" | "longtext" | "mediumtext" | "tinytext" | "enum" | "set" | "string" => "VARCHAR",

        "timestamp" | "timestamp without time zone" | "datetime" => "TIMESTAMP",
        "timestamp with time zone" | "timestamptz" => "TIMESTAMPTZ",
        "date" => "DATE",
        "time" | "time without time zone" => "TIME",
        "time with time zone" | "timetz" => "VARCHAR",
        "interval" => "INTERVAL",

        "bytea" | "blob" | "binary" | "varbinary" | "longblob" | "mediumblob" | "tinyblob"
        | "bindata" => "BLOB",

        "json" | "jsonb" | "object" => "VARCHAR",
        "uuid" | "objectid" => "VARCHAR",

        "inet" | "cidr" | "macaddr" | "macaddr8" => "VARCHAR",
        "point" | "line" | "lseg" | "box" | "path" | "polygon" | "circle" => "VARCHAR",
        "xml" | "tsvector" | "tsquery" | "bit" | "bit varying" | "varbit" => "VARCHAR",

        _ => {
            // Parameterized forms like varchar(255) or numeric(10,2)
            if normalized.starts_with("varchar")
                || normalized.starts_with("character varying")
                || normalized.starts_with("char")
                || normalized.starts_with("character")
            {
                return "VARCHAR";
            }
            if normalized.starts_with("numeric") || normalized.starts_with("decimal") {
                return "DOUBLE";
            }
            if normalized.starts_with("timestamp") {
                return "TIMESTAMP";
            }
            if normalized.starts_with("time") {
                return "VARCHAR";
            }
            if normalized.starts_with("bit") {
                return "VARCHAR";
            }
            "VARCHAR"
        }
    }
}

fn value_to_duckdb(value: &Value) -> DuckValue {
    match value {
        Value::Null => DuckValue::Null,
        Value::Bool(b) => DuckValue::Boolean(*b),
        Value::Int(i) => DuckValue::BigInt(*i),
        Value::Float(f) => DuckValue::Double(*f),
        Value::Text(s) => DuckValue::Text(s.clone()),
        Value::Bytes(b) => DuckValue::Blob(b.clone()),
        Value::Json(j) => DuckValue::Text(j.to_string()),
        Value::Array(arr) => DuckValue::Text(serde_json::to_string(arr).unwrap_or_default()),
    }
}

fn extract_duckdb_value(row: &duckdb::Row<'_>, idx: usize) -> Value {
    if let Ok(v) = row.get::<_, Option<i64>>(idx) {
        return match v {
            Some(i) => Value::Int(i),
            None => Value::Null,
        };
    }
    if let Ok(v) = row.get::<_, Option<f64>>(idx) {
        return match v {
            Some(f) => Value::Float(f),
            None => Value::Null,
        };
    }
    if let Ok(v) = row.get::<_, Option<bool>>(idx) {
        return match v {
            Some(b) => Value::Bool(b),
            None => Value::Null,
        };
    }
    if let Ok(v) = row.get::<_, Option<String>>(idx) {
        return match v {
            Some(s) => Value::Text(s),
            None => Value::Null,
        };
    }
    if let Ok(v) = row.get::<_, Option<Vec<u8>>>(idx) {
        return match v {
            Some(b) => Value::Bytes(b),
            None => Value::Null,
        };
    }
    Value::Null
}
