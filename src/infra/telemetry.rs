use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};
use crate::worker::metrics::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_FETCH_TOTAL, METRIC_INSTALL_MS,
    METRIC_NETWORK_FAILURE, METRIC_OFFLINE_FALLBACK, METRIC_STORE_FAILED, METRIC_TRIM_EVICTED,
};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Connection-level chatter from the HTTP stack, kept out of `info` logs.
const QUIET_TARGETS: [&str; 3] = ["hyper_util=warn", "reqwest=warn", "rustls=warn"];

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let output = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
    };

    tracing_subscriber::registry()
        .with(filter(logging.level)?)
        .with(ErrorLayer::default())
        .with(output)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("failed to install tracing subscriber: {err}")))
}

fn filter(level: LevelFilter) -> Result<EnvFilter, InfraError> {
    QUIET_TARGETS.iter().try_fold(
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy(),
        |filter, directive| {
            directive
                .parse()
                .map(|parsed| filter.add_directive(parsed))
                .map_err(|err| InfraError::telemetry(format!("bad directive `{directive}`: {err}")))
        },
    )
}

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_FETCH_TOTAL,
            Unit::Count,
            "Total number of requests intercepted by the worker, by class."
        );
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of requests answered from a cache namespace."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache lookups that found nothing."
        );
        describe_counter!(
            METRIC_NETWORK_FAILURE,
            Unit::Count,
            "Total number of network fetches that produced no response."
        );
        describe_counter!(
            METRIC_OFFLINE_FALLBACK,
            Unit::Count,
            "Total number of navigations answered with a precached fallback page."
        );
        describe_counter!(
            METRIC_TRIM_EVICTED,
            Unit::Count,
            "Total number of entries evicted by namespace trims."
        );
        describe_counter!(
            METRIC_STORE_FAILED,
            Unit::Count,
            "Total number of response copies that could not be stored."
        );
        describe_histogram!(
            METRIC_INSTALL_MS,
            Unit::Milliseconds,
            "Worker install latency in milliseconds."
        );
    });
}
