// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the federation gateway
//!
//! All driver- and engine-specific errors are mapped to these unified error
//! types so front-end adapters get a consistent taxonomy to translate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all gateway operations
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum GatewayError {
    #[error("Datasource '{name}' already exists")]
    DuplicateName { name: String },

    #[error("Connection failed: {message}")]
    Connectivity { message: String },

    #[error("Datasource '{name}' already present in catalog")]
    AlreadyPresent { name: String },

    #[error("Introspection failed: {message}")]
    Introspection { message: String },

    #[error("Failed to parse query '{query}': {message}")]
    QueryParse { query: String, message: String },

    #[error("Query execution error: {message}")]
    QueryExecution { message: String },

    #[error("Datasource not found: {name}")]
    NotFound { name: String },

    #[error("Invalid filter pattern '{pattern}': {message}")]
    InvalidFilter { pattern: String, message: String },

    #[error("Operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    pub fn duplicate_name(name: impl Into<String>) -> Self {
        Self::DuplicateName { name: name.into() }
    }

    pub fn connectivity(msg: impl Into<String>) -> Self {
        Self::Connectivity { message: msg.into() }
    }

    pub fn already_present(name: impl Into<String>) -> Self {
        Self::AlreadyPresent { name: name.into() }
    }

    pub fn introspection(msg: impl Into<String>) -> Self {
        Self::Introspection { message: msg.into() }
    }

    pub fn query_parse(query: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::QueryParse {
            query: query.into(),
            message: msg.into(),
        }
    }

    pub fn query_execution(msg: impl Into<String>) -> Self {
        Self::QueryExecution { message: msg.into() }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    pub fn invalid_filter(pattern: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::InvalidFilter {
            pattern: pattern.into(),
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { message: msg.into() }
    }
}

/// Result type alias for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
