//! Webhook sink: POSTs each payment as JSON to a configured URL.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::error::DeliveryError;
use crate::pipeline::types::PaymentDetails;
use crate::sinks::Sink;

/// Header carrying the shared secret.
pub const SECRET_HEADER: &str = "X-Webhook-Secret";

/// Event name sent with every payload.
pub const PAYMENT_EVENT: &str = "payment_received";

/// Wire format of a webhook call.
#[derive(Debug, Serialize)]
pub struct WebhookPayload<'a> {
    pub event: &'static str,
    pub data: &'a PaymentDetails,
    /// ISO-8601 UTC, e.g. `2025-02-22T10:00:00Z`.
    pub timestamp: String,
}

impl<'a> WebhookPayload<'a> {
    pub fn new(data: &'a PaymentDetails, now: DateTime<Utc>) -> Self {
        Self {
            event: PAYMENT_EVENT,
            data,
            timestamp: now.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

pub struct WebhookSink {
    url: String,
    secret: SecretString,
    timeout: Duration,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(url: String, secret: SecretString, timeout: Duration) -> Self {
        Self {
            url,
            secret,
            timeout,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Sink for WebhookSink {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, details: &PaymentDetails) -> Result<(), DeliveryError> {
        let payload = WebhookPayload::new(details, Utc::now());

        let resp = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(SECRET_HEADER, self.secret.expose_secret())
            .json(&payload)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest("webhook", self.timeout, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(DeliveryError::Rejected {
                sink: "webhook".into(),
                status: status.as_u16(),
            });
        }

        tracing::info!(
            transaction_id = details.get("transaction_id").unwrap_or("N/A"),
            status = status.as_u16(),
            "Webhook notification sent"
        );
        Ok(())
    }
}
