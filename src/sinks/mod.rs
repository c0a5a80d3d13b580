//! Notification sinks for extracted payments.

pub mod telegram;
pub mod webhook;

pub use telegram::TelegramSink;
pub use webhook::WebhookSink;

use std::time::Duration;

use async_trait::async_trait;

use crate::config::NotificationConfig;
use crate::error::DeliveryError;
use crate::pipeline::types::PaymentDetails;

/// Upper bound on any single delivery request.
pub const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

/// Receives a completed payment record.
#[async_trait]
pub trait Sink: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Hand the record off. `Ok` means the remote side accepted it.
    async fn deliver(&self, details: &PaymentDetails) -> Result<(), DeliveryError>;
}

/// Build every sink present in the notification config.
pub fn build_sinks(config: &NotificationConfig) -> Vec<Box<dyn Sink>> {
    let mut sinks: Vec<Box<dyn Sink>> = Vec::new();
    if let Some(telegram) = &config.telegram {
        sinks.push(Box::new(TelegramSink::new(
            telegram.bot_token.clone(),
            telegram.chat_id.clone(),
        )));
    }
    if let Some(webhook) = &config.webhook {
        sinks.push(Box::new(WebhookSink::new(
            webhook.url.clone(),
            webhook.secret.clone(),
            webhook.timeout(),
        )));
    }
    sinks
}
