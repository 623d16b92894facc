//! Outbound notification sinks

pub mod webhook;

use async_trait::async_trait;
use tracing::info;

use crate::errors::DeliveryError;

pub use webhook::WebhookNotifier;

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Sink that writes notifications to the log. Used when no webhook is configured.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn send(&self, title: &str, body: &str) -> Result<(), DeliveryError> {
        info!(title = %title, body = %body, "notification");
        Ok(())
    }
}
