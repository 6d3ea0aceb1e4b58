//! Order lookups: cache first, store on a miss.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::repos::{OrdersRepo, RepoError};
use crate::cache::OrderCache;
use crate::domain::order::Order;

#[derive(Debug, Error)]
pub enum OrderLookupError {
    #[error("order `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Repo(RepoError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupSource {
    Cache,
    Store,
}

impl LookupSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LookupSource::Cache => "cache",
            LookupSource::Store => "store",
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderLookup {
    pub order: Arc<Order>,
    pub source: LookupSource,
}

pub struct OrderService {
    cache: Arc<OrderCache>,
    orders: Arc<dyn OrdersRepo>,
    repopulate_on_read: bool,
}

impl OrderService {
    pub fn new(
        cache: Arc<OrderCache>,
        orders: Arc<dyn OrdersRepo>,
        repopulate_on_read: bool,
    ) -> Self {
        Self {
            cache,
            orders,
            repopulate_on_read,
        }
    }

    pub fn cache(&self) -> &Arc<OrderCache> {
        &self.cache
    }

    pub async fn find(&self, order_uid: &str) -> Result<OrderLookup, OrderLookupError> {
        if let Some(order) = self.cache.get(order_uid) {
            return Ok(OrderLookup {
                order,
                source: LookupSource::Cache,
            });
        }

        let order = match self.orders.read_order(order_uid).await {
            Ok(order) => Arc::new(order),
            Err(RepoError::NotFound) => {
                return Err(OrderLookupError::NotFound(order_uid.to_string()));
            }
            Err(err) => return Err(OrderLookupError::Repo(err)),
        };
        debug!(order_uid, "order served from store");

        if self.repopulate_on_read {
            self.cache.set(order_uid, Arc::clone(&order)).await;
        }

        Ok(OrderLookup {
            order,
            source: LookupSource::Store,
        })
    }
}
