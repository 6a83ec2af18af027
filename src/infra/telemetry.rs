use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of cache hits."
        );
        describe_counter!(
            metric_names::METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cache misses, labelled by reason."
        );
        describe_counter!(
            metric_names::METRIC_CACHE_DISCARDED,
            Unit::Count,
            "Fetched values not cached because a dependency changed during the fetch."
        );
        describe_counter!(
            metric_names::METRIC_CACHE_INVALIDATE,
            Unit::Count,
            "Total number of subject invalidations."
        );
        describe_histogram!(
            metric_names::METRIC_CACHE_FETCH_MS,
            Unit::Milliseconds,
            "Upstream fetch latency on cache miss in milliseconds."
        );
        describe_gauge!(
            metric_names::METRIC_CACHE_ENTRIES,
            Unit::Count,
            "Cached entries after the last sweep."
        );
        describe_gauge!(
            metric_names::METRIC_CACHE_TAGS,
            Unit::Count,
            "Tracked invalidation tags after the last sweep."
        );
    });
}
