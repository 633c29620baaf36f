use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

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
            "tagcache_hit_total",
            Unit::Count,
            "Requests answered from the cache."
        );
        describe_counter!(
            "tagcache_miss_total",
            Unit::Count,
            "Requests forwarded to the backend after a cache miss."
        );
        describe_counter!(
            "tagcache_store_total",
            Unit::Count,
            "Backend responses stored under their cache-keys tags."
        );
        describe_counter!(
            "tagcache_flush_entries_total",
            Unit::Count,
            "Entries evicted by tag invalidation."
        );
        describe_counter!(
            "tagcache_upstream_error_total",
            Unit::Count,
            "Backend requests that failed at the transport level."
        );
        describe_counter!(
            "tagcache_oversized_total",
            Unit::Count,
            "Tagged responses passed through uncached because the body exceeded the buffer limit."
        );
    });
}
