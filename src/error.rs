//! Error types for payment-watch.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type for a polling run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Extraction error: {0}")]
    Extract(#[from] ExtractError),
}

/// Configuration-related errors. Always fatal, raised before any network I/O.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration file not found at {}", .0.display())]
    NotFound(PathBuf),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mail store errors.
///
/// `Authentication`, `Transport` and `Search` end the run; `Fetch` and
/// `Store` are contained at the message boundary.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Authentication failed on {server}: {reason}")]
    Authentication { server: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Search rejected by server: {0}")]
    Search(String),

    #[error("Failed to fetch message {id}: {reason}")]
    Fetch { id: String, reason: String },

    #[error("Failed to update flags on message {id}: {reason}")]
    Store { id: String, reason: String },

    #[error("Unexpected server response: {0}")]
    Protocol(String),

    #[error("Session is closed")]
    Closed,
}

impl From<std::io::Error> for MailError {
    fn from(e: std::io::Error) -> Self {
        MailError::Transport(e.to_string())
    }
}

/// Attachment decoding errors. Per-attachment: the part is skipped.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Attachment is not a readable PDF: {0}")]
    NotPdf(String),

    #[error("PDF parser aborted on malformed input")]
    ParserPanicked,

    #[error("Message could not be parsed as MIME")]
    Mime,
}

/// Field extraction errors.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("No bank rules apply to sender {sender}")]
    NoRuleMatch { sender: String },

    #[error("Field name {bank}.{field} is reserved for message provenance")]
    ReservedField { bank: String, field: String },

    #[error("Invalid label pattern for {bank}.{field}: {reason}")]
    InvalidPattern {
        bank: String,
        field: String,
        reason: String,
    },
}

/// Notification delivery errors. Per-message: the message stays unread.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Sink {sink} failed to send: {reason}")]
    SendFailed { sink: String, reason: String },

    #[error("Sink {sink} timed out after {timeout:?}")]
    Timeout { sink: String, timeout: Duration },

    #[error("Sink {sink} rejected delivery with status {status}")]
    Rejected { sink: String, status: u16 },
}

impl DeliveryError {
    /// Classify a reqwest failure for the named sink.
    pub(crate) fn from_reqwest(sink: &str, timeout: Duration, e: reqwest::Error) -> Self {
        if e.is_timeout() {
            DeliveryError::Timeout {
                sink: sink.to_string(),
                timeout,
            }
        } else {
            DeliveryError::SendFailed {
                sink: sink.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

/// Result type alias for payment-watch.
pub type Result<T> = std::result::Result<T, Error>;
