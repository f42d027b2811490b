// SPDX-License-Identifier: Apache-2.0

//! Federated query execution across registered datasources

pub mod engine;
pub mod executor;
pub mod parser;
pub mod planner;
pub mod types;

pub use executor::execute_query;
pub use types::{FederationPlan, SourceFetchPlan, TableRef, DEFAULT_ROW_LIMIT};
