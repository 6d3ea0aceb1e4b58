//! Postgres LISTEN/NOTIFY subscription feeding the ingestion pipeline.

use std::time::Duration;

use metrics::counter;
use sqlx::postgres::{PgListener, PgPool};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::error::InfraError;

const METRIC_RECONNECT: &str = "ordercache_listener_reconnect_total";
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Forwards every notification payload on `channel` into a bounded queue.
pub struct ChannelListener {
    pool: PgPool,
    channel: String,
}

impl ChannelListener {
    pub fn new(pool: PgPool, channel: impl Into<String>) -> Self {
        Self {
            pool,
            channel: channel.into(),
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Subscribe and forward payloads until the receiving side of `sender` is dropped.
    ///
    /// Failing to subscribe is fatal. Once subscribed, connection losses are logged
    /// and the subscription is re-established; notifications sent while disconnected
    /// are not redelivered.
    pub async fn run(self, sender: mpsc::Sender<String>) -> Result<(), InfraError> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|err| InfraError::listener(format!("failed to connect: {err}")))?;
        listener.listen(&self.channel).await.map_err(|err| {
            InfraError::listener(format!("failed to listen on `{}`: {err}", self.channel))
        })?;
        info!(channel = %self.channel, "subscribed to ingestion channel");

        loop {
            let notification = match listener.recv().await {
                Ok(notification) => notification,
                Err(err) => {
                    counter!(METRIC_RECONNECT).increment(1);
                    warn!(
                        channel = %self.channel,
                        error = %err,
                        "ingestion channel connection lost, reconnecting"
                    );
                    tokio::time::sleep(RECONNECT_DELAY).await;
                    continue;
                }
            };

            debug!(
                channel = notification.channel(),
                process_id = notification.process_id(),
                "notification received"
            );
            if sender
                .send(notification.payload().to_string())
                .await
                .is_err()
            {
                info!(channel = %self.channel, "ingestion queue closed, listener stopped");
                return Ok(());
            }
        }
    }
}
