//! Ingestion of order payloads received from the message channel.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::application::repos::{DeadLetterRepo, OrdersRepo, RepoError};
use crate::cache::OrderCache;
use crate::config::IngestSettings;
use crate::domain::error::DomainError;
use crate::domain::order::Order;

const METRIC_ACCEPTED: &str = "ordercache_ingest_accepted_total";
const METRIC_MALFORMED: &str = "ordercache_ingest_malformed_total";
const METRIC_RETRY: &str = "ordercache_ingest_retry_total";
const METRIC_DEAD_LETTER: &str = "ordercache_ingest_dead_letter_total";

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error(transparent)]
    Invalid(#[from] DomainError),
    #[error("failed to persist order `{order_uid}` after {attempts} attempt(s): {source}")]
    Persistence {
        order_uid: String,
        attempts: u32,
        #[source]
        source: RepoError,
    },
}

/// What happened to a single payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Admitted { order_uid: String },
    Dropped,
    DeadLettered { order_uid: String, attempts: u32 },
}

/// Retry schedule for transient store failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Pause before attempt `attempt + 1`: the base delay doubled per failed attempt, capped.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }
}

impl From<&IngestSettings> for RetryPolicy {
    fn from(settings: &IngestSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts,
            base_delay: settings.retry_base_delay,
            max_delay: settings.retry_max_delay,
        }
    }
}

pub struct IngestPipeline {
    orders: Arc<dyn OrdersRepo>,
    dead_letters: Arc<dyn DeadLetterRepo>,
    cache: Arc<OrderCache>,
    retry: RetryPolicy,
}

impl IngestPipeline {
    pub fn new(
        orders: Arc<dyn OrdersRepo>,
        dead_letters: Arc<dyn DeadLetterRepo>,
        cache: Arc<OrderCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            orders,
            dead_letters,
            cache,
            retry,
        }
    }

    /// Process payloads until every sender is dropped.
    pub async fn run(&self, mut payloads: mpsc::Receiver<String>) {
        info!("ingestion pipeline started");
        while let Some(payload) = payloads.recv().await {
            self.handle(&payload).await;
        }
        info!("ingestion channel closed, pipeline stopped");
    }

    /// Persist and cache one payload. Never fails: problems are logged and reported
    /// through the outcome.
    pub async fn handle(&self, payload: &str) -> IngestOutcome {
        match self.ingest(payload).await {
            Ok(order_uid) => {
                counter!(METRIC_ACCEPTED).increment(1);
                info!(order_uid = %order_uid, "order ingested");
                IngestOutcome::Admitted { order_uid }
            }
            Err(err @ (IngestError::Malformed(_) | IngestError::Invalid(_))) => {
                counter!(METRIC_MALFORMED).increment(1);
                warn!(error = %err, payload_len = payload.len(), "dropping order payload");
                IngestOutcome::Dropped
            }
            Err(IngestError::Persistence {
                order_uid,
                attempts,
                source,
            }) => {
                counter!(METRIC_DEAD_LETTER).increment(1);
                error!(
                    order_uid = %order_uid,
                    attempts,
                    error = %source,
                    "order could not be persisted, moving payload to dead letters"
                );
                if let Err(err) = self
                    .dead_letters
                    .record_dead_letter(payload, &source.to_string(), attempts)
                    .await
                {
                    error!(order_uid = %order_uid, error = %err, "failed to record dead letter");
                }
                IngestOutcome::DeadLettered {
                    order_uid,
                    attempts,
                }
            }
        }
    }

    async fn ingest(&self, payload: &str) -> Result<String, IngestError> {
        let order = Order::from_json(payload.as_bytes())?;
        order.validate()?;

        let order_uid = self.write_with_retry(&order).await?;
        self.cache.set(&order_uid, Arc::new(order)).await;
        Ok(order_uid)
    }

    async fn write_with_retry(&self, order: &Order) -> Result<String, IngestError> {
        let max_attempts = self.retry.max_attempts.get();
        let mut attempt = 1;
        loop {
            match self.orders.write_order(order).await {
                Ok(order_uid) => return Ok(order_uid),
                Err(err) if err.is_transient() && attempt < max_attempts => {
                    let delay = self.retry.delay_after(attempt);
                    counter!(METRIC_RETRY).increment(1);
                    warn!(
                        order_uid = %order.order_uid,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "order write failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(source) => {
                    return Err(IngestError::Persistence {
                        order_uid: order.order_uid.clone(),
                        attempts: attempt,
                        source,
                    });
                }
            }
        }
    }
}
