mod common;

use std::collections::HashSet;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use metrics_util::debugging::DebuggingRecorder;
use ordercache::application::ingest::{IngestOutcome, IngestPipeline, RetryPolicy};
use ordercache::application::repos::{CacheLedgerRepo, OrdersRepo};
use ordercache::cache::{CacheConfig, OrderCache};
use ordercache::infra::db::PostgresRepositories;
use sqlx::PgPool;

use common::sample_order;

#[sqlx::test(migrations = "./migrations")]
async fn cache_and_ingest_paths_emit_expected_metric_keys(pool: PgPool) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    let repos = Arc::new(PostgresRepositories::new(pool));

    // Restore histogram needs a non-empty ledger.
    let seeded = sample_order("seeded");
    repos.write_order(&seeded).await.expect("write seeded order");
    repos
        .append_ledger("seeded", "metrics")
        .await
        .expect("append seeded ledger row");

    let config = CacheConfig::with_capacity(1, "metrics");
    let cache = Arc::new(OrderCache::bootstrap(&config, repos.clone(), repos.as_ref()).await);

    // Hit, miss and evict.
    assert!(cache.get("seeded").is_some());
    assert!(cache.get("missing").is_none());

    let pipeline = IngestPipeline::new(
        repos.clone(),
        repos.clone(),
        cache.clone(),
        RetryPolicy {
            max_attempts: NonZeroU32::new(2).expect("non-zero"),
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        },
    );
    let payload = serde_json::to_string(&sample_order("fresh")).expect("encode order");
    assert_eq!(
        pipeline.handle(&payload).await,
        IngestOutcome::Admitted {
            order_uid: "fresh".to_string()
        }
    );
    assert!(cache.get("seeded").is_none());

    assert_eq!(pipeline.handle("not json").await, IngestOutcome::Dropped);
    assert!(matches!(
        pipeline.handle(&payload).await,
        IngestOutcome::DeadLettered { attempts: 1, .. }
    ));

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "ordercache_cache_hit_total",
        "ordercache_cache_miss_total",
        "ordercache_cache_evict_total",
        "ordercache_cache_entries",
        "ordercache_cache_restore_ms",
        "ordercache_ingest_accepted_total",
        "ordercache_ingest_malformed_total",
        "ordercache_ingest_dead_letter_total",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
