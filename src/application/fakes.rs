//! In-memory repository used by unit tests.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::application::repos::{CacheLedgerRepo, DeadLetterRepo, OrdersRepo, RepoError};
use crate::domain::order::Order;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct DeadLetter {
    pub payload: String,
    pub reason: String,
    pub attempts: u32,
}

#[derive(Default)]
struct Faults {
    writes: VecDeque<RepoError>,
    reads: bool,
    ledger_append: bool,
    ledger_query: bool,
    ledger_clear: bool,
}

#[derive(Default)]
pub(crate) struct MemoryStore {
    orders: Mutex<HashMap<String, Order>>,
    ledger: Mutex<Vec<(String, String)>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    faults: Mutex<Faults>,
    writes_attempted: Mutex<u32>,
}

impl MemoryStore {
    pub(crate) async fn insert_order(&self, order: Order) {
        self.orders
            .lock()
            .await
            .insert(order.order_uid.clone(), order);
    }

    pub(crate) async fn seed_ledger(&self, instance_key: &str, order_uids: &[&str]) {
        let mut ledger = self.ledger.lock().await;
        for uid in order_uids {
            ledger.push((uid.to_string(), instance_key.to_string()));
        }
    }

    pub(crate) async fn ledger_for(&self, instance_key: &str) -> Vec<String> {
        self.ledger
            .lock()
            .await
            .iter()
            .filter(|(_, key)| key == instance_key)
            .map(|(uid, _)| uid.clone())
            .collect()
    }

    pub(crate) async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.clone()
    }

    pub(crate) async fn writes_attempted(&self) -> u32 {
        *self.writes_attempted.lock().await
    }

    pub(crate) async fn fail_next_writes(&self, errors: Vec<RepoError>) {
        self.faults.lock().await.writes.extend(errors);
    }

    pub(crate) async fn fail_reads(&self, fail: bool) {
        self.faults.lock().await.reads = fail;
    }

    pub(crate) async fn fail_ledger_append(&self, fail: bool) {
        self.faults.lock().await.ledger_append = fail;
    }

    pub(crate) async fn fail_ledger_query(&self, fail: bool) {
        self.faults.lock().await.ledger_query = fail;
    }

    pub(crate) async fn fail_ledger_clear(&self, fail: bool) {
        self.faults.lock().await.ledger_clear = fail;
    }
}

#[async_trait]
impl OrdersRepo for MemoryStore {
    async fn write_order(&self, order: &Order) -> Result<String, RepoError> {
        *self.writes_attempted.lock().await += 1;
        if let Some(err) = self.faults.lock().await.writes.pop_front() {
            return Err(err);
        }
        let mut orders = self.orders.lock().await;
        if orders.contains_key(&order.order_uid) {
            return Err(RepoError::Duplicate {
                constraint: "orders_pkey".to_string(),
            });
        }
        orders.insert(order.order_uid.clone(), order.clone());
        Ok(order.order_uid.clone())
    }

    async fn read_order(&self, order_uid: &str) -> Result<Order, RepoError> {
        if self.faults.lock().await.reads {
            return Err(RepoError::from_persistence("connection reset"));
        }
        self.orders
            .lock()
            .await
            .get(order_uid)
            .cloned()
            .ok_or(RepoError::NotFound)
    }
}

#[async_trait]
impl CacheLedgerRepo for MemoryStore {
    async fn append_ledger(&self, order_uid: &str, instance_key: &str) -> Result<(), RepoError> {
        if self.faults.lock().await.ledger_append {
            return Err(RepoError::Timeout);
        }
        self.ledger
            .lock()
            .await
            .push((order_uid.to_string(), instance_key.to_string()));
        Ok(())
    }

    async fn query_ledger(
        &self,
        instance_key: &str,
        limit: usize,
    ) -> Result<Vec<String>, RepoError> {
        if self.faults.lock().await.ledger_query {
            return Err(RepoError::from_persistence("relation \"cache\" does not exist"));
        }
        let mut rows = self.ledger_for(instance_key).await;
        rows.reverse();
        rows.truncate(limit);
        Ok(rows)
    }

    async fn clear_ledger(&self, instance_key: &str) -> Result<u64, RepoError> {
        if self.faults.lock().await.ledger_clear {
            return Err(RepoError::Timeout);
        }
        let mut ledger = self.ledger.lock().await;
        let before = ledger.len();
        ledger.retain(|(_, key)| key != instance_key);
        Ok((before - ledger.len()) as u64)
    }

    async fn count_ledger(&self, instance_key: &str) -> Result<u64, RepoError> {
        Ok(self.ledger_for(instance_key).await.len() as u64)
    }
}

#[async_trait]
impl DeadLetterRepo for MemoryStore {
    async fn record_dead_letter(
        &self,
        payload: &str,
        reason: &str,
        attempts: u32,
    ) -> Result<(), RepoError> {
        self.dead_letters.lock().await.push(DeadLetter {
            payload: payload.to_string(),
            reason: reason.to_string(),
            attempts,
        });
        Ok(())
    }
}
