//! Configuration types.
//!
//! The YAML file is parsed straight into these structs and validated once
//! by [`Config::load`]; everything downstream works with plain fields.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::pipeline::filter::FilterPolicy;
use crate::pipeline::rules::{BankRules, FieldExtractor};

/// Env var naming the config file.
pub const CONFIG_PATH_ENV: &str = "PAYMENT_WATCH_CONFIG";

/// Config file used when [`CONFIG_PATH_ENV`] is unset.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

/// Validated application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub email: EmailConfig,
    #[serde(default)]
    pub filtering: FilterPolicy,
    pub parsing_rules: BankRules,
    pub notifications: NotificationConfig,
}

/// IMAP account settings.
#[derive(Debug, Clone, Deserialize)]
pub struct EmailConfig {
    pub imap_server: String,
    #[serde(default = "default_imap_port")]
    pub imap_port: u16,
    pub username: String,
    pub password: SecretString,
    #[serde(default = "default_mailbox")]
    pub mailbox: String,
    /// Socket read timeout for the IMAP session.
    #[serde(default = "default_imap_timeout")]
    pub timeout_secs: u64,
}

impl EmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Notification sinks. At least one must be configured.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
    #[serde(default)]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: SecretString,
    #[serde(deserialize_with = "string_or_number")]
    pub chat_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub secret: SecretString,
    #[serde(default = "default_delivery_timeout")]
    pub timeout_secs: u64,
}

impl WebhookConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_imap_port() -> u16 {
    993
}

fn default_mailbox() -> String {
    "INBOX".to_string()
}

fn default_imap_timeout() -> u64 {
    30
}

fn default_delivery_timeout() -> u64 {
    10
}

/// Telegram chat ids are often written as bare integers in YAML.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Int(i64),
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s,
        Raw::Int(n) => n.to_string(),
    })
}

impl Config {
    /// Resolve the config path from `PAYMENT_WATCH_CONFIG`, falling back to
    /// `config/config.yaml`.
    pub fn default_path() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load, apply env overrides, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let mut config = Self::from_yaml(&raw)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML without env overrides or validation.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Secrets and the login may be injected through the environment so the
    /// config file can be committed without them.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(username) = std::env::var("EMAIL_USERNAME") {
            self.email.username = username;
        }
        if let Ok(password) = std::env::var("EMAIL_PASSWORD") {
            self.email.password = SecretString::from(password);
        }
        if let Ok(token) = std::env::var("TELEGRAM_BOT_TOKEN")
            && let Some(telegram) = self.notifications.telegram.as_mut()
        {
            telegram.bot_token = SecretString::from(token);
        }
        if let Ok(secret) = std::env::var("WEBHOOK_SECRET")
            && let Some(webhook) = self.notifications.webhook.as_mut()
        {
            webhook.secret = SecretString::from(secret);
        }
    }

    /// Check every required field once, so nothing downstream re-checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require("email.imap_server", &self.email.imap_server)?;
        require("email.username", &self.email.username)?;
        require("email.password", self.email.password.expose_secret())?;
        require("email.mailbox", &self.email.mailbox)?;

        if self.email.imap_port == 0 {
            return Err(ConfigError::InvalidValue {
                key: "email.imap_port".into(),
                message: "port must be non-zero".into(),
            });
        }

        if let Some(0) = self.filtering.time_window_minutes {
            return Err(ConfigError::InvalidValue {
                key: "filtering.time_window_minutes".into(),
                message: "must be positive; omit it to disable the window".into(),
            });
        }

        if self.parsing_rules.is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "parsing_rules".into(),
                hint: "Add at least one bank with field label patterns".into(),
            });
        }
        for bank in self.parsing_rules.banks() {
            if bank.fields.is_empty() {
                return Err(ConfigError::MissingRequired {
                    key: format!("parsing_rules.{}", bank.id),
                    hint: "A bank entry needs at least one field pattern".into(),
                });
            }
            if bank.sender_domains.iter().all(|d| d.trim().is_empty()) {
                return Err(ConfigError::MissingRequired {
                    key: format!("parsing_rules.{}.sender_domains", bank.id),
                    hint: "A bank entry needs at least one sender domain".into(),
                });
            }
        }

        FieldExtractor::new(&self.parsing_rules).map_err(|e| ConfigError::InvalidValue {
            key: "parsing_rules".into(),
            message: e.to_string(),
        })?;

        let notifications = &self.notifications;
        if notifications.telegram.is_none() && notifications.webhook.is_none() {
            return Err(ConfigError::MissingRequired {
                key: "notifications".into(),
                hint: "Configure notifications.telegram or notifications.webhook".into(),
            });
        }
        if let Some(telegram) = &notifications.telegram {
            require(
                "notifications.telegram.bot_token",
                telegram.bot_token.expose_secret(),
            )?;
            require("notifications.telegram.chat_id", &telegram.chat_id)?;
        }
        if let Some(webhook) = &notifications.webhook {
            require("notifications.webhook.url", &webhook.url)?;
            require("notifications.webhook.secret", webhook.secret.expose_secret())?;
            if !(webhook.url.starts_with("http://") || webhook.url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    key: "notifications.webhook.url".into(),
                    message: format!("expected an http(s) URL, got {}", webhook.url),
                });
            }
            if webhook.timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    key: "notifications.webhook.timeout_secs".into(),
                    message: "must be positive".into(),
                });
            }
        }

        Ok(())
    }
}

fn require(key: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::MissingRequired {
            key: key.to_string(),
            hint: "Field is missing or empty".to_string(),
        });
    }
    Ok(())
}
