//! Telegram sink. Posts a receipt summary through the Bot API.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::error::DeliveryError;
use crate::pipeline::types::PaymentDetails;
use crate::sinks::{DEFAULT_DELIVERY_TIMEOUT, Sink};

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// Sends one message per payment to a fixed chat.
pub struct TelegramSink {
    bot_token: SecretString,
    chat_id: String,
    api_base: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl TelegramSink {
    pub fn new(bot_token: SecretString, chat_id: String) -> Self {
        Self {
            bot_token,
            chat_id,
            api_base: TELEGRAM_API_BASE.to_string(),
            timeout: DEFAULT_DELIVERY_TIMEOUT,
            client: reqwest::Client::new(),
        }
    }

    /// Point at a different Bot API host (local bot server, tests).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{method}",
            self.api_base,
            self.bot_token.expose_secret()
        )
    }

    async fn post(&self, body: &serde_json::Value) -> Result<reqwest::Response, DeliveryError> {
        self.client
            .post(self.api_url("sendMessage"))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::from_reqwest("telegram", self.timeout, e.without_url()))
    }

    /// Send with Markdown first, then retry as plain text if Telegram
    /// rejects the markup.
    async fn send_message(&self, text: &str) -> Result<(), DeliveryError> {
        let markdown_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "parse_mode": "Markdown"
        });

        let markdown_resp = self.post(&markdown_body).await?;
        if markdown_resp.status().is_success() {
            return Ok(());
        }

        let markdown_status = markdown_resp.status();
        tracing::warn!(
            status = ?markdown_status,
            "Telegram sendMessage with Markdown failed; retrying without parse_mode"
        );

        let plain_body = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
        });
        let plain_resp = self.post(&plain_body).await?;
        if !plain_resp.status().is_success() {
            return Err(DeliveryError::Rejected {
                sink: "telegram".into(),
                status: plain_resp.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl Sink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, details: &PaymentDetails) -> Result<(), DeliveryError> {
        self.send_message(&format_receipt(details)).await?;
        tracing::info!(
            transaction_id = details.get("transaction_id").unwrap_or("N/A"),
            "Telegram notification sent"
        );
        Ok(())
    }
}

/// Receipt summary in the operators' language. Missing fields show `N/A`.
pub fn format_receipt(details: &PaymentDetails) -> String {
    let field = |name: &str| details.get(name).unwrap_or("N/A");
    format!(
        "📢 *Novo Pagamento Recebido!*\n\n\
         🆔 *ID da Transação:* `{}`\n\
         👤 *Cliente:* {}\n\
         💰 *Valor:* `{}` CVE\n\
         📅 *Data do Pagamento:* {}\n\
         📝 *Descrição:* {}\n",
        field("transaction_id"),
        field("client_name"),
        field("amount_paid"),
        field("payment_date"),
        field("description"),
    )
}
