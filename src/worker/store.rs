//! Role-resolved view over the shared cache storage.

use std::sync::Arc;

use super::config::{CacheNames, CacheRole};
use super::namespace::CacheNamespace;
use super::request::RequestKey;
use super::response::FetchResponse;
use super::storage::CacheStorage;

/// Cache storage as one worker version sees it: every role resolves to the
/// namespace name of that version.
#[derive(Clone)]
pub struct CacheStore {
    storage: Arc<CacheStorage>,
    names: CacheNames,
}

impl CacheStore {
    pub fn new(storage: Arc<CacheStorage>, names: CacheNames) -> Self {
        Self { storage, names }
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn storage(&self) -> &Arc<CacheStorage> {
        &self.storage
    }

    /// Open the namespace currently bound to `role`.
    pub fn namespace(&self, role: CacheRole) -> Arc<CacheNamespace> {
        self.storage.open(self.names.name(role))
    }

    /// Look `key` up in every namespace, current or not.
    pub fn match_any(&self, key: &RequestKey) -> Option<FetchResponse> {
        self.storage.match_any(key)
    }

    /// Delete every namespace outside the current name set, returning what was removed.
    pub fn delete_stale(&self) -> Vec<String> {
        self.storage
            .keys()
            .into_iter()
            .filter(|name| !self.names.is_current(name))
            .filter(|name| self.storage.delete(name))
            .collect()
    }
}
