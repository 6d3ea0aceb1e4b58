use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
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
            "ordercache_cache_hit_total",
            Unit::Count,
            "Total number of order cache hits."
        );
        describe_counter!(
            "ordercache_cache_miss_total",
            Unit::Count,
            "Total number of order cache misses."
        );
        describe_counter!(
            "ordercache_cache_evict_total",
            Unit::Count,
            "Total number of orders evicted from the cache due to capacity."
        );
        describe_gauge!(
            "ordercache_cache_entries",
            Unit::Count,
            "Current number of orders held by the cache."
        );
        describe_counter!(
            "ordercache_ledger_append_failure_total",
            Unit::Count,
            "Total number of cache admissions whose ledger append failed."
        );
        describe_histogram!(
            "ordercache_cache_restore_ms",
            Unit::Milliseconds,
            "Cache restore latency at startup in milliseconds."
        );
        describe_counter!(
            "ordercache_ingest_accepted_total",
            Unit::Count,
            "Total number of ingested orders persisted and cached."
        );
        describe_counter!(
            "ordercache_ingest_malformed_total",
            Unit::Count,
            "Total number of ingestion payloads dropped as malformed or invalid."
        );
        describe_counter!(
            "ordercache_ingest_retry_total",
            Unit::Count,
            "Total number of order write retries."
        );
        describe_counter!(
            "ordercache_ingest_dead_letter_total",
            Unit::Count,
            "Total number of payloads moved to dead letters."
        );
        describe_counter!(
            "ordercache_listener_reconnect_total",
            Unit::Count,
            "Total number of channel listener reconnects."
        );
        describe_counter!(
            "ordercache_http_order_lookup_total",
            Unit::Count,
            "Total number of order lookups served over HTTP, by outcome."
        );
    });
}
