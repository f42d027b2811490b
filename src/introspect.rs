// SPDX-License-Identifier: Apache-2.0

//! Parallel introspection fan-out
//!
//! Runs a read-only probe once per registered datasource, concurrently, with
//! per-task isolation: a failure, panic, or timeout in one task drops that
//! datasource's contribution but never cancels or fails the siblings. All
//! tasks are joined before returning, and results come back in
//! datasource-name order so discovery output is deterministic.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::warn;

use crate::engine::registry::DatasourceRegistry;
use crate::engine::traits::Backend;

/// Per-task deadline for a single backend probe
pub const INTROSPECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Executes `probe` once per registered datasource, in parallel.
///
/// Each task owns its own backend handle clone for the duration of the call;
/// a slow or unreachable backend can delay the aggregate by at most
/// `per_task_timeout` and never blocks the healthy majority's results.
pub async fn for_each_datasource<T, F, Fut>(
    registry: &DatasourceRegistry,
    per_task_timeout: Duration,
    probe: F,
) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(String, Arc<dyn Backend>) -> Fut,
    Fut: Future<Output = crate::engine::error::GatewayResult<T>> + Send + 'static,
{
    let entries = registry.snapshot().await;

    let mut handles = Vec::with_capacity(entries.len());
    for (name, backend) in entries {
        let task = probe(name.clone(), backend);
        let handle = tokio::spawn(async move { timeout(per_task_timeout, task).await });
        handles.push((name, handle));
    }

    let mut results = Vec::with_capacity(handles.len());
    for (name, handle) in handles {
        match handle.await {
            Ok(Ok(Ok(value))) => results.push(value),
            Ok(Ok(Err(err))) => {
                warn!(datasource = %name, error = %err, "introspection failed; dropping contribution");
            }
            Ok(Err(_)) => {
                warn!(
                    datasource = %name,
                    timeout_ms = per_task_timeout.as_millis() as u64,
                    "introspection timed out; dropping contribution"
                );
            }
            Err(join_err) => {
                warn!(datasource = %name, error = %join_err, "introspection task panicked; dropping contribution");
            }
        }
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::engine::error::{GatewayError, GatewayResult};
    use crate::engine::types::{ColumnDescriptor, ColumnInfo, Row};

    struct FlakyBackend {
        fail: bool,
        delay: Duration,
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        fn backend_type(&self) -> &'static str {
            "flaky"
        }

        fn connection_target(&self) -> Option<String> {
            None
        }

        async fn probe(&self) -> GatewayResult<()> {
            Ok(())
        }

        async fn product_name(&self) -> GatewayResult<String> {
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(GatewayError::introspection("backend unreachable"))
            } else {
                Ok("Flaky".to_string())
            }
        }

        async fn list_schemas(&self) -> GatewayResult<Vec<String>> {
            Ok(vec![])
        }

        async fn list_tables(&self, _schema: Option<&str>) -> GatewayResult<Vec<String>> {
            Ok(vec![])
        }

        async fn table_columns(
            &self,
            _schema: Option<&str>,
            _table: &str,
        ) -> GatewayResult<Vec<ColumnDescriptor>> {
            Ok(vec![])
        }

        async fn fetch_table(
            &self,
            _schema: Option<&str>,
            _table: &str,
            _row_limit: u64,
        ) -> GatewayResult<(Vec<ColumnInfo>, Vec<Row>)> {
            Ok((vec![], vec![]))
        }

        async fn close(&self) {}
    }

    async fn registry_with(
        entries: Vec<(&str, bool, Duration)>,
    ) -> DatasourceRegistry {
        let registry = DatasourceRegistry::new();
        for (name, fail, delay) in entries {
            registry
                .insert_new(name, Arc::new(FlakyBackend { fail, delay }))
                .await
                .unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn one_failure_does_not_drop_the_others() {
        let registry = registry_with(vec![
            ("a", false, Duration::ZERO),
            ("b", true, Duration::ZERO),
            ("c", false, Duration::ZERO),
        ])
        .await;

        let results = for_each_datasource(&registry, Duration::from_secs(1), |name, backend| {
            async move {
                backend.product_name().await?;
                Ok(name)
            }
        })
        .await;

        assert_eq!(results, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn timeout_cancels_only_the_slow_task() {
        let registry = registry_with(vec![
            ("fast", false, Duration::ZERO),
            ("slow", false, Duration::from_millis(500)),
        ])
        .await;

        let results =
            for_each_datasource(&registry, Duration::from_millis(50), |name, backend| {
                async move {
                    backend.product_name().await?;
                    Ok(name)
                }
            })
            .await;

        assert_eq!(results, vec!["fast"]);
    }

    #[tokio::test]
    async fn empty_registry_yields_empty_results() {
        let registry = DatasourceRegistry::new();
        let results = for_each_datasource(&registry, Duration::from_secs(1), |name, _backend| {
            async move { Ok(name) }
        })
        .await;
        assert!(results.is_empty());
    }
}
