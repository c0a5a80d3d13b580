//! Fetched message representation and header decoding.

use std::fmt;

use mail_parser::MessageParser;

use crate::error::MailError;

/// Server-assigned message identifier (an IMAP UID), stable for the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(String);

impl MessageId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched message. Immutable once built.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    /// Decoded `Subject` (RFC 2047 charsets honored, UTF-8 otherwise).
    pub subject: String,
    /// `From` header value as written, unfolded.
    pub sender: String,
    /// Full RFC 822 bytes.
    pub raw: Vec<u8>,
}

impl RawMessage {
    /// Decode the headers the pipeline needs from full message bytes.
    pub fn parse(id: MessageId, raw: Vec<u8>) -> Result<Self, MailError> {
        let parsed = MessageParser::default()
            .parse(&raw)
            .ok_or_else(|| MailError::Fetch {
                id: id.to_string(),
                reason: "message is not valid RFC 5322".into(),
            })?;

        let subject = parsed.subject().unwrap_or_default().to_string();
        let sender = parsed.header_raw("From").map(unfold).unwrap_or_default();

        Ok(Self {
            id,
            subject,
            sender,
            raw,
        })
    }
}

/// Unfold a raw header value (drop CRLF before continuation whitespace)
/// and trim it. Encoded-words are left as written.
fn unfold(value: &str) -> String {
    value.replace("\r\n", "").replace('\n', "").trim().to_string()
}
