//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::order::Order;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }

    /// Whether repeating the same operation later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::Timeout)
    }
}

/// Durable order storage.
#[async_trait]
pub trait OrdersRepo: Send + Sync {
    /// Persist an order with its delivery, payment and items in one transaction.
    ///
    /// Returns the stored `order_uid`. Nothing is committed on failure.
    async fn write_order(&self, order: &Order) -> Result<String, RepoError>;

    /// Rebuild a full order by identifier, items in their original order.
    async fn read_order(&self, order_uid: &str) -> Result<Order, RepoError>;
}

/// Durable trace of cache membership, partitioned by application instance.
#[async_trait]
pub trait CacheLedgerRepo: Send + Sync {
    async fn append_ledger(&self, order_uid: &str, instance_key: &str) -> Result<(), RepoError>;

    /// Up to `limit` most recently appended identifiers, newest first.
    async fn query_ledger(&self, instance_key: &str, limit: usize)
    -> Result<Vec<String>, RepoError>;

    /// Remove every ledger row for the instance, returning the number removed.
    async fn clear_ledger(&self, instance_key: &str) -> Result<u64, RepoError>;

    async fn count_ledger(&self, instance_key: &str) -> Result<u64, RepoError>;
}

/// Storage for ingestion payloads that could not be persisted.
#[async_trait]
pub trait DeadLetterRepo: Send + Sync {
    async fn record_dead_letter(
        &self,
        payload: &str,
        reason: &str,
        attempts: u32,
    ) -> Result<(), RepoError>;
}
