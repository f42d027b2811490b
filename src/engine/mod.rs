// SPDX-License-Identifier: Apache-2.0

// Engine module
// Universal abstraction layer over heterogeneous data backends

pub mod drivers;
pub mod error;
pub mod registry;
pub mod traits;
pub mod types;

pub use error::{GatewayError, GatewayResult};
pub use registry::{ConnectorRegistry, DatasourceRegistry};
pub use traits::{Backend, Connector};
pub use types::*;
