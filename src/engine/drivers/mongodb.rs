// SPDX-License-Identifier: Apache-2.0

//! MongoDB backend
//!
//! Document stores have no declared schema, so column metadata is inferred
//! by sampling documents: the field set is the union over the sample in
//! first-seen order, and each field's type is taken from its first non-null
//! occurrence. Databases act as the native sub-schemas; collections as
//! tables.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Bson, Document};
use mongodb::options::ClientOptions;
use mongodb::Client;

use crate::engine::drivers::{effective_url, redact_url};
use crate::engine::error::{GatewayError, GatewayResult};
use crate::engine::traits::{Backend, Connector};
use crate::engine::types::{
    AddDatasourceRequest, ColumnDescriptor, ColumnInfo, Row, Value,
};

const CONNECT_TIMEOUT_SECS: u64 = 10;
const SERVER_SELECTION_TIMEOUT_SECS: u64 = 5;

/// Number of documents sampled for schema inference
const SAMPLE_LIMIT: i64 = 50;

/// Databases that never belong to user data
const SYSTEM_DATABASES: &[&str] = &["admin", "local", "config"];

pub struct MongoConnector;

#[async_trait]
impl Connector for MongoConnector {
    fn schemes(&self) -> &'static [&'static str] {
        &["mongodb", "mongodb+srv"]
    }

    fn display_name(&self) -> &'static str {
        "MongoDB"
    }

    async fn connect(&self, request: &AddDatasourceRequest) -> GatewayResult<Arc<dyn Backend>> {
        let conn_str = effective_url(request)?;

        let mut options = ClientOptions::parse(&conn_str)
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        options.connect_timeout = Some(Duration::from_secs(CONNECT_TIMEOUT_SECS));
        options.server_selection_timeout = Some(Duration::from_secs(SERVER_SELECTION_TIMEOUT_SECS));

        let client =
            Client::with_options(options).map_err(|e| GatewayError::connectivity(e.to_string()))?;

        Ok(Arc::new(MongoBackend {
            client,
            target: redact_url(&request.url),
        }))
    }
}

pub struct MongoBackend {
    client: Client,
    target: Option<String>,
}

impl MongoBackend {
    /// Collects the union of field names over a document sample,
    /// preserving first-seen order.
    fn union_fields(docs: &[Document]) -> Vec<String> {
        let mut fields: Vec<String> = Vec::new();
        for doc in docs {
            for key in doc.keys() {
                if !fields.iter().any(|f| f == key) {
                    fields.push(key.clone());
                }
            }
        }
        fields
    }

    fn bson_type_name(value: &Bson) -> &'static str {
        match value {
            Bson::Double(_) => "double",
            Bson::String(_) => "string",
            Bson::Document(_) => "object",
            Bson::Array(_) => "array",
            Bson::Boolean(_) => "bool",
            Bson::Int32(_) => "int",
            Bson::Int64(_) => "long",
            Bson::Timestamp(_) => "timestamp",
            Bson::DateTime(_) => "date",
            Bson::ObjectId(_) => "objectId",
            Bson::Binary(_) => "binData",
            Bson::Decimal128(_) => "decimal",
            Bson::Null => "null",
            _ => "string",
        }
    }

    fn bson_to_value(value: &Bson) -> Value {
        match value {
            Bson::Null => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(i) => Value::Int(*i as i64),
            Bson::Int64(i) => Value::Int(*i),
            Bson::Double(f) => Value::Float(*f),
            Bson::String(s) => Value::Text(s.clone()),
            Bson::ObjectId(oid) => Value::Text(oid.to_hex()),
            Bson::DateTime(dt) => {
                Value::Text(dt.try_to_rfc3339_string().unwrap_or_default())
            }
            Bson::Decimal128(d) => Value::Text(d.to_string()),
            Bson::Binary(bin) => Value::Bytes(bin.bytes.clone()),
            other => {
                Value::Json(other.clone().into_relaxed_extjson())
            }
        }
    }

    async fn sample_documents(
        &self,
        database: &str,
        collection: &str,
        limit: i64,
    ) -> GatewayResult<Vec<Document>> {
        let coll = self
            .client
            .database(database)
            .collection::<Document>(collection);

        let mut cursor = coll
            .find(doc! {})
            .limit(limit)
            .await
            .map_err(|e| GatewayError::introspection(e.to_string()))?;

        let mut docs = Vec::new();
        while let Some(doc) = cursor
            .try_next()
            .await
            .map_err(|e| GatewayError::introspection(e.to_string()))?
        {
            docs.push(doc);
        }
        Ok(docs)
    }
}

#[async_trait]
impl Backend for MongoBackend {
    fn backend_type(&self) -> &'static str {
        "mongodb"
    }

    fn connection_target(&self) -> Option<String> {
        self.target.clone()
    }

    async fn probe(&self) -> GatewayResult<()> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        Ok(())
    }

    async fn product_name(&self) -> GatewayResult<String> {
        let info = self
            .client
            .database("admin")
            .run_command(doc! { "buildInfo": 1 })
            .await
            .map_err(|e| GatewayError::connectivity(e.to_string()))?;
        let version = info.get_str("version").unwrap_or("unknown");
        Ok(format!("MongoDB {version}"))
    }

    async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
        let mut names = self
            .client
            .list_database_names()
            .await
            .map_err(|e| GatewayError::introspection(e.to_string()))?;
        names.retain(|name| !SYSTEM_DATABASES.contains(&name.as_str()));
        names.sort();
        Ok(names)
    }

    async fn list_tables(&self, schema: Option<&str>) -> GatewayResult<Vec<String>> {
        let Some(database) = schema else {
            return Err(GatewayError::introspection(
                "MongoDB requires a database for collection listing",
            ));
        };

        let mut names = self
            .client
            .database(database)
            .list_collection_names()
            .await
            .map_err(|e| GatewayError::introspection(e.to_string()))?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();
        Ok(names)
    }

    async fn table_columns(
        &self,
        schema: Option<&str>,
        table: &str,
    ) -> GatewayResult<Vec<ColumnDescriptor>> {
        let Some(database) = schema else {
            return Err(GatewayError::introspection(
                "MongoDB requires a database for schema inference",
            ));
        };

        let docs = self.sample_documents(database, table, SAMPLE_LIMIT).await?;
        let fields = Self::union_fields(&docs);

        Ok(fields
            .into_iter()
            .map(|name| {
                let inferred = docs
                    .iter()
                    .filter_map(|d| d.get(&name))
                    .find(|v| !matches!(v, Bson::Null))
                    .map(Self::bson_type_name)
                    .unwrap_or("string");
                ColumnDescriptor {
                    is_primary_key: name == "_id",
                    name,
                    data_type: inferred.to_string(),
                    nullable: true,
                    default_value: None,
                    is_auto_increment: false,
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
        let Some(database) = schema else {
            return Err(GatewayError::query_execution(
                "MongoDB requires a database for collection fetch",
            ));
        };

        let docs = self
            .sample_documents(database, table, row_limit.min(i64::MAX as u64) as i64)
            .await
            .map_err(|e| GatewayError::query_execution(e.to_string()))?;
        let fields = Self::union_fields(&docs);

        let columns: Vec<ColumnInfo> = fields
            .iter()
            .map(|name| {
                let inferred = docs
                    .iter()
                    .filter_map(|d| d.get(name))
                    .find(|v| !matches!(v, Bson::Null))
                    .map(Self::bson_type_name)
                    .unwrap_or("string");
                ColumnInfo {
                    name: name.clone(),
                    data_type: inferred.to_string(),
                    nullable: true,
                }
            })
            .collect();

        let rows: Vec<Row> = docs
            .iter()
            .map(|doc| Row {
                values: fields
                    .iter()
                    .map(|name| doc.get(name).map(Self::bson_to_value).unwrap_or(Value::Null))
                    .collect(),
            })
            .collect();

        Ok((columns, rows))
    }

    async fn close(&self) {
        // The driver shuts its pools down when the last Client clone drops;
        // nothing to release eagerly.
    }
}
