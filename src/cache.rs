// SPDX-License-Identifier: Apache-2.0

//! Metadata cache
//!
//! Read-through cache for the discovery operations. Each operation caches
//! per filter key; a missing filter and an empty-string filter are distinct
//! keys on purpose (the former matches everything, the latter only empty
//! names). Any topology change invalidates all regions at once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use crate::engine::types::{DatasourceDescriptor, SchemaDescriptor, TableDescriptor};

/// Cache key for a filtered discovery call
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FilterKey {
    /// No filter supplied
    All,
    /// Full-match regex pattern, cached verbatim
    Pattern(String),
}

impl From<Option<&str>> for FilterKey {
    fn from(filter: Option<&str>) -> Self {
        match filter {
            None => FilterKey::All,
            Some(pattern) => FilterKey::Pattern(pattern.to_string()),
        }
    }
}

#[derive(Default)]
pub struct MetadataCache {
    /// Bumped by `invalidate_all`; stores carrying an older generation are
    /// discarded, so a listing computed before a topology change can never
    /// repopulate the cache after it
    generation: AtomicU64,
    datasources: Mutex<Option<Vec<DatasourceDescriptor>>>,
    schemas: Mutex<HashMap<FilterKey, Vec<SchemaDescriptor>>>,
    tables: Mutex<HashMap<FilterKey, Vec<TableDescriptor>>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current cache generation. Callers capture this before computing a
    /// listing and hand it back to the matching `store_*` call.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn lookup_datasources(&self) -> Option<Vec<DatasourceDescriptor>> {
        self.datasources.lock().clone()
    }

    pub fn store_datasources(&self, generation: u64, descriptors: Vec<DatasourceDescriptor>) {
        let mut slot = self.datasources.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("stale datasource listing discarded");
            return;
        }
        *slot = Some(descriptors);
    }

    pub fn lookup_schemas(&self, key: &FilterKey) -> Option<Vec<SchemaDescriptor>> {
        self.schemas.lock().get(key).cloned()
    }

    pub fn store_schemas(&self, generation: u64, key: FilterKey, descriptors: Vec<SchemaDescriptor>) {
        let mut region = self.schemas.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("stale schema listing discarded");
            return;
        }
        region.insert(key, descriptors);
    }

    pub fn lookup_tables(&self, key: &FilterKey) -> Option<Vec<TableDescriptor>> {
        self.tables.lock().get(key).cloned()
    }

    pub fn store_tables(&self, generation: u64, key: FilterKey, descriptors: Vec<TableDescriptor>) {
        let mut region = self.tables.lock();
        if self.generation.load(Ordering::Acquire) != generation {
            debug!("stale table listing discarded");
            return;
        }
        region.insert(key, descriptors);
    }

    /// Drops every cached entry in every region and advances the
    /// generation. The bump happens under all three region locks, so an
    /// in-flight store either lands before the clear or observes the new
    /// generation and discards itself.
    pub fn invalidate_all(&self) {
        let mut datasources = self.datasources.lock();
        let mut schemas = self.schemas.lock();
        let mut tables = self.tables.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *datasources = None;
        schemas.clear();
        tables.clear();
        debug!("metadata cache invalidated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::engine::types::ConnectionStatus;

    fn descriptor(name: &str) -> DatasourceDescriptor {
        DatasourceDescriptor {
            name: name.to_string(),
            connection_status: ConnectionStatus::Connected,
            backend_type: "postgres".to_string(),
            product_name: None,
            connection_target: None,
        }
    }

    #[test]
    fn absent_and_empty_filters_are_distinct_keys() {
        assert_ne!(
            FilterKey::from(None),
            FilterKey::from(Some("")),
        );
        assert_eq!(FilterKey::from(None), FilterKey::All);
        assert_eq!(
            FilterKey::from(Some("ds1\\..*")),
            FilterKey::Pattern("ds1\\..*".to_string())
        );
    }

    #[test]
    fn lookup_misses_before_store_and_hits_after() {
        let cache = MetadataCache::new();
        assert!(cache.lookup_datasources().is_none());

        cache.store_datasources(cache.generation(), vec![descriptor("pg1")]);
        let hit = cache.lookup_datasources().unwrap();
        assert_eq!(hit.len(), 1);
        assert_eq!(hit[0].name, "pg1");
    }

    #[test]
    fn filtered_regions_key_per_pattern() {
        let cache = MetadataCache::new();
        cache.store_schemas(cache.generation(), FilterKey::All, vec![]);

        assert!(cache.lookup_schemas(&FilterKey::All).is_some());
        assert!(cache
            .lookup_schemas(&FilterKey::Pattern("pg1\\..*".to_string()))
            .is_none());
    }

    #[test]
    fn invalidation_clears_every_region() {
        let cache = MetadataCache::new();
        cache.store_datasources(cache.generation(), vec![descriptor("pg1")]);
        cache.store_schemas(cache.generation(), FilterKey::All, vec![]);
        cache.store_tables(cache.generation(), FilterKey::Pattern("x".to_string()), vec![]);

        cache.invalidate_all();

        assert!(cache.lookup_datasources().is_none());
        assert!(cache.lookup_schemas(&FilterKey::All).is_none());
        assert!(cache
            .lookup_tables(&FilterKey::Pattern("x".to_string()))
            .is_none());
    }

    #[test]
    fn caching_empty_results_is_a_hit() {
        let cache = MetadataCache::new();
        cache.store_datasources(cache.generation(), vec![]);
        assert_eq!(cache.lookup_datasources(), Some(vec![]));
    }

    #[test]
    fn store_from_an_older_generation_is_discarded() {
        let cache = MetadataCache::new();
        let before = cache.generation();

        cache.invalidate_all();

        // A listing computed before the invalidation must not land
        cache.store_datasources(before, vec![descriptor("pg1")]);
        assert!(cache.lookup_datasources().is_none());
        cache.store_schemas(before, FilterKey::All, vec![]);
        assert!(cache.lookup_schemas(&FilterKey::All).is_none());
        cache.store_tables(before, FilterKey::All, vec![]);
        assert!(cache.lookup_tables(&FilterKey::All).is_none());

        // A current-generation store still does
        cache.store_datasources(cache.generation(), vec![descriptor("pg1")]);
        assert!(cache.lookup_datasources().is_some());
    }
}
