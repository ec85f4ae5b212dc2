//! Metric names emitted by the worker.

pub const METRIC_FETCH_TOTAL: &str = "folio_sw_fetch_total";
pub const METRIC_CACHE_HIT: &str = "folio_sw_cache_hit_total";
pub const METRIC_CACHE_MISS: &str = "folio_sw_cache_miss_total";
pub const METRIC_NETWORK_FAILURE: &str = "folio_sw_network_failure_total";
pub const METRIC_OFFLINE_FALLBACK: &str = "folio_sw_offline_fallback_total";
pub const METRIC_STORE_FAILED: &str = "folio_sw_cache_store_failed_total";
pub const METRIC_INSTALL_MS: &str = "folio_sw_install_ms";
pub use super::trim::METRIC_TRIM_EVICTED;
