//! Client-side message filtering.
//!
//! The IMAP search can only narrow by flags and date, so subject keywords
//! and sender domains are checked here after each message is fetched.

use serde::Deserialize;

use crate::mail::RawMessage;

/// Which messages a run looks at.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterPolicy {
    #[serde(default = "default_unread_only")]
    pub fetch_unread_only: bool,
    #[serde(default)]
    pub time_window_minutes: Option<u32>,
    #[serde(default)]
    pub subject_keywords: Vec<String>,
    #[serde(default)]
    pub sender_domains: Vec<String>,
}

fn default_unread_only() -> bool {
    true
}

impl Default for FilterPolicy {
    fn default() -> Self {
        Self {
            fetch_unread_only: true,
            time_window_minutes: None,
            subject_keywords: Vec::new(),
            sender_domains: Vec::new(),
        }
    }
}

impl FilterPolicy {
    /// Both the subject and the sender predicate must hold.
    pub fn matches(&self, message: &RawMessage) -> bool {
        subject_matches(&self.subject_keywords, &message.subject)
            && sender_matches(&self.sender_domains, &message.sender)
    }
}

/// Empty keyword list → match all, otherwise any case-insensitive substring.
pub fn subject_matches(keywords: &[String], subject: &str) -> bool {
    contains_any(keywords, subject)
}

/// Empty domain list → match all, otherwise any case-insensitive substring
/// of the raw `From` value.
pub fn sender_matches(domains: &[String], sender: &str) -> bool {
    contains_any(domains, sender)
}

fn contains_any(needles: &[String], haystack: &str) -> bool {
    if needles.is_empty() {
        return true;
    }
    let haystack = haystack.to_lowercase();
    needles
        .iter()
        .any(|n| haystack.contains(&n.to_lowercase()))
}
