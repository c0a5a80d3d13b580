//! Shared types for the extraction pipeline.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::mail::RawMessage;

/// Keys [`PaymentDetails`] serializes next to the bank fields. Bank rules
/// may not use them as field names.
pub const PROVENANCE_FIELDS: [&str; 3] = ["email_id", "sender", "subject"];

/// Payment fields pulled from one message, plus where they came from.
///
/// Serializes flat: `{"transaction_id": .., "email_id": .., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Bank-specific fields (transaction_id, client_name, amount_paid, ...).
    #[serde(flatten)]
    pub fields: BTreeMap<String, String>,
    pub email_id: String,
    pub sender: String,
    pub subject: String,
}

impl PaymentDetails {
    /// Empty record carrying the message's provenance.
    pub fn for_message(message: &RawMessage) -> Self {
        Self {
            fields: BTreeMap::new(),
            email_id: message.id.to_string(),
            sender: message.sender.clone(),
            subject: message.subject.clone(),
        }
    }

    /// True when no bank field was extracted. Provenance alone never counts.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }
}

/// Terminal state of one message in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Fetch failed; message untouched.
    FetchFailed,
    /// Subject or sender filter rejected it.
    FilteredOut,
    /// No bank field extracted; left unread, nothing sent.
    Empty,
    /// A sink failed; left unread for the next run.
    DeliveryFailed,
    /// Delivered, but the `\Seen` flag could not be set.
    DeliveredUnmarked,
    /// Delivered and marked processed.
    Processed,
}

/// Per-run counters, logged when the batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Identifiers returned by the server search.
    pub selected: usize,
    /// Messages that passed the subject/sender filter.
    pub matched: usize,
    /// Messages with at least one bank field.
    pub extracted: usize,
    /// Messages every sink accepted.
    pub delivered: usize,
    /// Messages flagged `\Seen`.
    pub marked: usize,
    pub skipped_fetch: usize,
    pub failed_delivery: usize,
}

impl RunSummary {
    pub fn record(&mut self, outcome: MessageOutcome) {
        match outcome {
            MessageOutcome::FetchFailed => self.skipped_fetch += 1,
            MessageOutcome::FilteredOut => {}
            MessageOutcome::Empty => self.matched += 1,
            MessageOutcome::DeliveryFailed => {
                self.matched += 1;
                self.extracted += 1;
                self.failed_delivery += 1;
            }
            MessageOutcome::DeliveredUnmarked => {
                self.matched += 1;
                self.extracted += 1;
                self.delivered += 1;
            }
            MessageOutcome::Processed => {
                self.matched += 1;
                self.extracted += 1;
                self.delivered += 1;
                self.marked += 1;
            }
        }
    }
}
