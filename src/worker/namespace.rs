//! A single named cache: request keys to response snapshots in insertion order.

use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use axum::http::Method;
use lru::LruCache;

use super::error::CacheError;
use super::lock::{rw_read, rw_write};
use super::request::RequestKey;
use super::response::FetchResponse;

const SOURCE: &str = "worker::namespace";

/// Byte accounting shared by every namespace of one storage.
#[derive(Debug, Default)]
pub struct StorageUsage {
    quota: Option<u64>,
    used: AtomicU64,
}

impl StorageUsage {
    pub fn new(quota: Option<u64>) -> Self {
        Self {
            quota,
            used: AtomicU64::new(0),
        }
    }

    pub fn used(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    pub fn quota(&self) -> Option<u64> {
        self.quota
    }

    fn reserve(&self, namespace: &str, incoming: u64, replaced: u64) -> Result<(), CacheError> {
        let quota = self.quota;
        self.used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                let next = current.saturating_sub(replaced).saturating_add(incoming);
                match quota {
                    Some(limit) if next > limit => None,
                    _ => Some(next),
                }
            })
            .map(|_| ())
            .map_err(|_| CacheError::QuotaExceeded {
                namespace: namespace.to_string(),
                requested: incoming,
                quota: quota.unwrap_or_default(),
            })
    }

    fn release(&self, bytes: u64) {
        let _ = self
            .used
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(current.saturating_sub(bytes))
            });
    }
}

/// Named cache namespace.
///
/// Entries keep insertion order: [`keys`](Self::keys) enumerates oldest first
/// and a lookup never reorders anything. Overwriting a key moves it to the
/// newest position.
pub struct CacheNamespace {
    name: String,
    sequence: u64,
    // Unbounded LRU used purely as an insertion-ordered map: reads go through
    // `peek`, so order only changes on `put`.
    entries: RwLock<LruCache<RequestKey, FetchResponse>>,
    bytes: AtomicU64,
    usage: Arc<StorageUsage>,
}

impl CacheNamespace {
    pub(crate) fn new(name: impl Into<String>, sequence: u64, usage: Arc<StorageUsage>) -> Self {
        Self {
            name: name.into(),
            sequence,
            entries: RwLock::new(LruCache::unbounded()),
            bytes: AtomicU64::new(0),
            usage,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn match_request(&self, key: &RequestKey) -> Option<FetchResponse> {
        rw_read(&self.entries, SOURCE, "match_request")
            .peek(key)
            .cloned()
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        rw_read(&self.entries, SOURCE, "contains").contains(key)
    }

    /// Store `response` under `key`, replacing any previous entry.
    pub fn put(&self, key: RequestKey, response: FetchResponse) -> Result<(), CacheError> {
        if key.method() != Method::GET {
            return Err(CacheError::UnsupportedMethod {
                method: key.method().clone(),
            });
        }

        let incoming = response.byte_size();
        let mut entries = rw_write(&self.entries, SOURCE, "put");
        let replaced = entries.peek(&key).map(FetchResponse::byte_size).unwrap_or(0);
        self.usage.reserve(&self.name, incoming, replaced)?;
        entries.put(key, response);
        self.bytes.fetch_add(incoming, Ordering::AcqRel);
        self.bytes.fetch_sub(replaced, Ordering::AcqRel);
        Ok(())
    }

    /// Remove an entry. Returns false when nothing was stored under `key`.
    pub fn delete(&self, key: &RequestKey) -> bool {
        let removed = rw_write(&self.entries, SOURCE, "delete").pop(key);
        match removed {
            Some(response) => {
                let size = response.byte_size();
                self.bytes.fetch_sub(size, Ordering::AcqRel);
                self.usage.release(size);
                true
            }
            None => false,
        }
    }

    /// Keys in insertion order, oldest first.
    pub fn keys(&self) -> Vec<RequestKey> {
        rw_read(&self.entries, SOURCE, "keys")
            .iter()
            .rev()
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Entries in insertion order, oldest first.
    pub fn entries(&self) -> Vec<(RequestKey, FetchResponse)> {
        rw_read(&self.entries, SOURCE, "entries")
            .iter()
            .rev()
            .map(|(key, response)| (key.clone(), response.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Acquire)
    }

    /// Drop every entry and hand the bytes back to the shared usage.
    pub(crate) fn release_all(&self) {
        rw_write(&self.entries, SOURCE, "release_all").clear();
        let bytes = self.bytes.swap(0, Ordering::AcqRel);
        self.usage.release(bytes);
    }
}
