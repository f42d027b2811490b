// SPDX-License-Identifier: Apache-2.0

//! Universal data types for the federation gateway
//!
//! These types provide a normalized representation of datasource and schema
//! concepts across relational and document backends.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::observability::Sensitive;

/// Unique identifier for a query, used for log correlation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Best-effort connection status reported for a registered datasource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
    Unknown,
}

/// Immutable snapshot describing a registered datasource.
///
/// The live backend handle behind it is owned exclusively by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasourceDescriptor {
    pub name: String,
    pub connection_status: ConnectionStatus,
    pub backend_type: String,
    /// Product name as reported by the backend, when reachable
    pub product_name: Option<String>,
    /// Credential-redacted endpoint, when known
    pub connection_target: Option<String>,
}

/// A native sub-schema of a datasource, addressed as `datasource.schema`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    /// Ordered name segments: datasource first, then native schema name
    pub qualified_path: Vec<String>,
    pub datasource: String,
    pub schema_name: String,
    pub table_count: usize,
}

/// Column metadata discovered through backend reflection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
    pub constraints: Vec<String>,
}

/// A table (or document collection), addressed as `datasource.schema.table`
/// or `datasource.table` for flat-namespace backends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub qualified_path: Vec<String>,
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDescriptor>,
}

/// Registration request for a new datasource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddDatasourceRequest {
    pub name: String,
    /// Connection URI, e.g. `postgres://host:5432/db`
    pub url: String,
    pub username: Option<String>,
    /// Redacted in logs and serialized output
    pub password: Option<Sensitive<String>>,
    /// Backend-specific property bag
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Universal value representation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    Json(serde_json::Value),
    Array(Vec<Value>),
}

impl Value {
    /// Converts to a `serde_json::Value` for result-row assembly.
    pub fn into_json(self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

/// Column metadata for a fetched result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// A single row of data, indexed by column order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Row {
    pub values: Vec<Value>,
}

/// An ordered name→value mapping, one per result row.
///
/// `serde_json::Map` preserves insertion order, so iteration follows the
/// declared column order.
pub type RowMap = serde_json::Map<String, serde_json::Value>;

/// Result of a federated query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Column names in the plan's declared order
    pub columns: Vec<String>,
    pub rows: Vec<RowMap>,
    /// Wall-clock execution time, excluding parse time. Zero for EXPLAIN.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Assembles a result from positional columns/rows.
    pub fn from_parts(columns: Vec<ColumnInfo>, rows: Vec<Row>, execution_time_ms: u64) -> Self {
        let names: Vec<String> = columns.into_iter().map(|c| c.name).collect();
        let mapped = rows
            .into_iter()
            .map(|row| {
                let mut map = RowMap::new();
                for (name, value) in names.iter().zip(row.values) {
                    map.insert(name.clone(), value.into_json());
                }
                map
            })
            .collect();
        Self {
            columns: names,
            rows: mapped,
            execution_time_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_serializes_untagged() {
        assert_eq!(serde_json::to_value(Value::Int(7)).unwrap(), serde_json::json!(7));
        assert_eq!(
            serde_json::to_value(Value::Text("x".into())).unwrap(),
            serde_json::json!("x")
        );
        assert_eq!(serde_json::to_value(Value::Null).unwrap(), serde_json::Value::Null);
    }

    #[test]
    fn bytes_round_trip_as_base64() {
        let v = Value::Bytes(vec![1, 2, 3]);
        let json = serde_json::to_string(&v).unwrap();
        assert_eq!(json, "\"AQID\"");
    }

    #[test]
    fn from_parts_preserves_column_order() {
        let columns = vec![
            ColumnInfo { name: "b".into(), data_type: "BIGINT".into(), nullable: true },
            ColumnInfo { name: "a".into(), data_type: "VARCHAR".into(), nullable: true },
        ];
        let rows = vec![Row { values: vec![Value::Int(1), Value::Text("x".into())] }];
        let result = QueryResult::from_parts(columns, rows, 3);

        assert_eq!(result.columns, vec!["b", "a"]);
        let keys: Vec<&String> = result.rows[0].keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
        assert_eq!(result.execution_time_ms, 3);
    }

    #[test]
    fn request_never_serializes_password() {
        let request = AddDatasourceRequest {
            name: "ds".into(),
            url: "postgres://localhost/db".into(),
            username: Some("u".into()),
            password: Some(Sensitive::new("secret".to_string())),
            properties: HashMap::new(),
        };
        let json = serde_json::to_string(&request).unwrap();
        assert!(!json.contains("secret"));
        let debug = format!("{request:?}");
        assert!(!debug.contains("secret"));
    }
}
