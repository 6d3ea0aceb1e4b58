//! Cache of orders synchronized with the durable membership ledger.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::application::repos::{CacheLedgerRepo, OrdersRepo, RepoError};
use crate::domain::order::Order;

use super::config::CacheConfig;
use super::lock::{read_guard, write_guard};
use super::ring::FifoRing;

const METRIC_HIT: &str = "ordercache_cache_hit_total";
const METRIC_MISS: &str = "ordercache_cache_miss_total";
const METRIC_EVICT: &str = "ordercache_cache_evict_total";
const METRIC_ENTRIES: &str = "ordercache_cache_entries";
const METRIC_LEDGER_APPEND_FAILURE: &str = "ordercache_ledger_append_failure_total";
const METRIC_RESTORE_MS: &str = "ordercache_cache_restore_ms";

/// Point-in-time view of the cache layout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheSnapshot {
    pub instance_key: String,
    pub capacity: usize,
    pub position: usize,
    pub entries: usize,
    pub slots: Vec<Option<String>>,
}

/// Fixed-capacity order cache.
///
/// Admissions are recorded in the ledger of `instance_key` after the in-memory
/// update; the ledger is only read back by [`OrderCache::bootstrap`].
pub struct OrderCache {
    ring: RwLock<FifoRing<Arc<Order>>>,
    instance_key: String,
    ledger: Arc<dyn CacheLedgerRepo>,
}

impl OrderCache {
    /// Build the cache and restore its layout from the ledger.
    ///
    /// Bodies of ledger identifiers are re-read from `orders`. Identifiers the store
    /// cannot produce are skipped. An empty or unreadable ledger yields a cold cache.
    #[instrument(skip_all, fields(instance_key = %config.instance_key))]
    pub async fn bootstrap(
        config: &CacheConfig,
        ledger: Arc<dyn CacheLedgerRepo>,
        orders: &dyn OrdersRepo,
    ) -> Self {
        let capacity = config.resolve_capacity();
        let ring = restore_ring(capacity, &config.instance_key, ledger.as_ref(), orders).await;
        gauge!(METRIC_ENTRIES).set(ring.len() as f64);

        Self {
            ring: RwLock::new(ring),
            instance_key: config.instance_key.clone(),
            ledger,
        }
    }

    pub fn capacity(&self) -> usize {
        read_guard(&self.ring, "capacity").capacity()
    }

    pub fn is_enabled(&self) -> bool {
        self.capacity() > 0
    }

    pub fn instance_key(&self) -> &str {
        &self.instance_key
    }

    pub fn get(&self, order_uid: &str) -> Option<Arc<Order>> {
        let found = read_guard(&self.ring, "get").get(order_uid).cloned();
        if found.is_some() {
            counter!(METRIC_HIT).increment(1);
        } else {
            counter!(METRIC_MISS).increment(1);
        }
        found
    }

    /// Admit or refresh an order, then append it to the ledger.
    ///
    /// A failed ledger append is logged and does not undo the admission.
    pub async fn set(&self, order_uid: &str, order: Arc<Order>) {
        let (position, evicted, entries) = {
            let mut ring = write_guard(&self.ring, "set");
            if ring.capacity() == 0 {
                debug!(order_uid, "cache disabled, admission skipped");
                return;
            }
            let evicted = ring.admit(order_uid.to_string(), order);
            (ring.position(), evicted, ring.len())
        };

        if let Some(evicted) = evicted {
            counter!(METRIC_EVICT).increment(1);
            debug!(order_uid = %evicted, "order evicted from cache");
        }
        gauge!(METRIC_ENTRIES).set(entries as f64);

        if let Err(err) = self
            .ledger
            .append_ledger(order_uid, &self.instance_key)
            .await
        {
            counter!(METRIC_LEDGER_APPEND_FAILURE).increment(1);
            warn!(
                order_uid,
                instance_key = %self.instance_key,
                error = %err,
                "failed to append order to cache ledger"
            );
        }

        debug!(order_uid, position, entries, "order admitted to cache");
    }

    /// Delete every ledger row of this instance. The in-memory entries are kept.
    #[instrument(skip(self), fields(instance_key = %self.instance_key))]
    pub async fn finish(&self) {
        match self.ledger.clear_ledger(&self.instance_key).await {
            Ok(removed) => info!(removed, "cache ledger cleared"),
            Err(err) => warn!(error = %err, "failed to clear cache ledger"),
        }
    }

    /// Number of ledger rows currently recorded for this instance.
    pub async fn ledger_len(&self) -> Result<u64, RepoError> {
        self.ledger.count_ledger(&self.instance_key).await
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let ring = read_guard(&self.ring, "snapshot");
        CacheSnapshot {
            instance_key: self.instance_key.clone(),
            capacity: ring.capacity(),
            position: ring.position(),
            entries: ring.len(),
            slots: ring.slots().to_vec(),
        }
    }
}

async fn restore_ring(
    capacity: usize,
    instance_key: &str,
    ledger: &dyn CacheLedgerRepo,
    orders: &dyn OrdersRepo,
) -> FifoRing<Arc<Order>> {
    let mut ring = FifoRing::new(capacity);
    if capacity == 0 {
        info!("cache disabled, skipping restore");
        return ring;
    }

    let started_at = Instant::now();
    let mut order_uids = match ledger.query_ledger(instance_key, capacity).await {
        Ok(order_uids) => order_uids,
        Err(err) => {
            warn!(error = %err, "failed to read cache ledger, starting cold");
            return ring;
        }
    };
    if order_uids.is_empty() {
        info!("cache ledger is empty, starting cold");
        return ring;
    }

    // Ledger rows come newest first; slots are filled oldest first.
    order_uids.truncate(capacity);
    order_uids.reverse();

    let mut bodies: HashMap<String, Option<Arc<Order>>> = HashMap::new();
    for order_uid in &order_uids {
        if bodies.contains_key(order_uid) {
            continue;
        }
        let body = match orders.read_order(order_uid).await {
            Ok(order) => Some(Arc::new(order)),
            Err(RepoError::NotFound) => {
                warn!(order_uid = %order_uid, "ledger references unknown order, skipping");
                None
            }
            Err(err) => {
                warn!(order_uid = %order_uid, error = %err, "failed to load ledger order, skipping");
                None
            }
        };
        bodies.insert(order_uid.clone(), body);
    }

    for order_uid in order_uids {
        if let Some(Some(order)) = bodies.get(&order_uid) {
            ring.admit(order_uid, Arc::clone(order));
        }
    }

    histogram!(METRIC_RESTORE_MS).record(started_at.elapsed().as_secs_f64() * 1_000.0);
    info!(
        restored = ring.len(),
        position = ring.position(),
        slots = ?ring.slots(),
        "cache restored from ledger"
    );
    ring
}
