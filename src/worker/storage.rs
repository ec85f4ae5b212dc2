//! Process-wide set of named cache namespaces.

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use dashmap::DashMap;
use folio_offline_types::NamespaceSummary;
use tracing::debug;

use super::namespace::{CacheNamespace, StorageUsage};
use super::request::RequestKey;
use super::response::FetchResponse;

/// All cache namespaces known to the process, shared by every worker version.
///
/// Namespaces are created on first [`open`](Self::open) and enumerate in
/// creation order, which is also the search order of [`match_any`](Self::match_any).
pub struct CacheStorage {
    namespaces: DashMap<String, Arc<CacheNamespace>>,
    next_sequence: AtomicU64,
    usage: Arc<StorageUsage>,
}

impl CacheStorage {
    pub fn new(quota_bytes: Option<u64>) -> Self {
        Self {
            namespaces: DashMap::new(),
            next_sequence: AtomicU64::new(0),
            usage: Arc::new(StorageUsage::new(quota_bytes)),
        }
    }

    /// Open the namespace called `name`, creating it when missing.
    pub fn open(&self, name: &str) -> Arc<CacheNamespace> {
        if let Some(existing) = self.namespaces.get(name) {
            return existing.value().clone();
        }

        self.namespaces
            .entry(name.to_string())
            .or_insert_with(|| {
                debug!(cache = name, "creating cache namespace");
                let sequence = self.next_sequence.fetch_add(1, Ordering::AcqRel);
                Arc::new(CacheNamespace::new(name, sequence, self.usage.clone()))
            })
            .value()
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CacheNamespace>> {
        self.namespaces.get(name).map(|entry| entry.value().clone())
    }

    pub fn has(&self, name: &str) -> bool {
        self.namespaces.contains_key(name)
    }

    /// Delete a namespace and all its entries. Returns false when it did not exist.
    pub fn delete(&self, name: &str) -> bool {
        match self.namespaces.remove(name) {
            Some((_, namespace)) => {
                namespace.release_all();
                true
            }
            None => false,
        }
    }

    /// Namespace names in creation order.
    pub fn keys(&self) -> Vec<String> {
        self.namespaces()
            .iter()
            .map(|namespace| namespace.name().to_string())
            .collect()
    }

    /// Namespaces in creation order.
    pub fn namespaces(&self) -> Vec<Arc<CacheNamespace>> {
        let mut all: Vec<Arc<CacheNamespace>> = self
            .namespaces
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|namespace| namespace.sequence());
        all
    }

    /// Look `key` up in every namespace, oldest namespace first.
    pub fn match_any(&self, key: &RequestKey) -> Option<FetchResponse> {
        self.namespaces()
            .iter()
            .find_map(|namespace| namespace.match_request(key))
    }

    pub fn usage(&self) -> &StorageUsage {
        &self.usage
    }

    pub fn summaries(&self) -> Vec<NamespaceSummary> {
        self.namespaces()
            .iter()
            .map(|namespace| NamespaceSummary {
                name: namespace.name().to_string(),
                entries: namespace.len(),
                bytes: namespace.bytes(),
            })
            .collect()
    }
}

impl fmt::Debug for CacheStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStorage")
            .field("namespaces", &self.keys())
            .field("used_bytes", &self.usage.used())
            .field("quota_bytes", &self.usage.quota())
            .finish()
    }
}

impl Default for CacheStorage {
    fn default() -> Self {
        Self::new(None)
    }
}
