//! Notification delivery
//!
//! Delivery to the guardian channel is an external collaborator; the
//! gateway ships a webhook dispatcher and a periodic drain loop. The queue
//! itself guarantees one record per escalation; this loop only attempts
//! delivery and transitions status, so a failed attempt retries on the
//! next tick without duplicating anything.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use trustline_core::{Error, Result};
use trustline_ledger::{drain, NotificationDispatcher, NotificationQueue, TutorNotification};

/// Delivers notifications by POSTing the payload to a webhook
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
}

impl WebhookDispatcher {
    /// Create a dispatcher for the given webhook URL
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Arc<Self>> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::internal(format!("failed to build webhook client: {}", e)))?;

        Ok(Arc::new(Self {
            client,
            url: url.into(),
        }))
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn deliver(&self, notification: &TutorNotification) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::internal(format!("webhook request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "webhook returned {}",
                response.status()
            )));
        }

        Ok(())
    }
}

/// Periodically drain the queue through the dispatcher
pub fn spawn_dispatch_loop(
    queue: Arc<NotificationQueue>,
    dispatcher: Arc<WebhookDispatcher>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            interval.tick().await;
            let delivered = drain(&queue, dispatcher.as_ref()).await;
            if delivered > 0 {
                debug!(delivered, "guardian notifications dispatched");
            }
        }
    })
}
