//! Entry-count bound for a namespace.

use metrics::counter;
use tracing::debug;

use super::namespace::CacheNamespace;

pub const METRIC_TRIM_EVICTED: &str = "folio_sw_trim_evicted_total";

/// Delete the oldest-inserted entries of `namespace` until at most
/// `max_entries` remain. Returns how many entries were deleted.
///
/// Safe to run concurrently with writers and with other trims: a key that
/// is already gone is simply skipped.
pub fn trim_namespace(namespace: &CacheNamespace, max_entries: usize) -> usize {
    let keys = namespace.keys();
    if keys.len() <= max_entries {
        return 0;
    }

    let excess = keys.len() - max_entries;
    let removed = keys
        .iter()
        .take(excess)
        .filter(|key| namespace.delete(key))
        .count();

    if removed > 0 {
        counter!(METRIC_TRIM_EVICTED, "cache" => namespace.name().to_string())
            .increment(removed as u64);
    }
    debug!(
        cache = namespace.name(),
        removed,
        remaining = namespace.len(),
        max_entries,
        "trimmed cache namespace"
    );
    removed
}
