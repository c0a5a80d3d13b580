//! Batch driver: one sequential pass over the mailbox.
//!
//! Per message: fetch → filter → attachment text → field extraction →
//! delivery → mark `\Seen`. A message is only flagged after every sink
//! accepted it, so anything that failed is picked up again next run.
//! Only search and transport failures end the batch early.

use chrono::Utc;
use tracing::{Instrument, Span, debug, error, info, warn};

use crate::error::{ExtractError, MailError};
use crate::mail::{MailStore, MessageId, SearchQuery};
use crate::pipeline::attachments;
use crate::pipeline::filter::FilterPolicy;
use crate::pipeline::rules::FieldExtractor;
use crate::pipeline::types::{MessageOutcome, PaymentDetails, RunSummary};
use crate::sinks::Sink;

/// Runs the extraction pipeline against a mail store.
pub struct PaymentProcessor {
    policy: FilterPolicy,
    extractor: FieldExtractor,
    sinks: Vec<Box<dyn Sink>>,
    span: Span,
}

impl PaymentProcessor {
    /// `span` is the logging context every record of this processor is
    /// emitted under.
    pub fn new(
        policy: FilterPolicy,
        extractor: FieldExtractor,
        sinks: Vec<Box<dyn Sink>>,
        span: Span,
    ) -> Self {
        Self {
            policy,
            extractor,
            sinks,
            span,
        }
    }

    /// Process every message the search returns.
    ///
    /// Errors only for failures that make the rest of the batch
    /// impossible (rejected search, dead connection).
    pub async fn run<S: MailStore>(&self, store: &mut S) -> Result<RunSummary, MailError> {
        self.run_batch(store).instrument(self.span.clone()).await
    }

    async fn run_batch<S: MailStore>(&self, store: &mut S) -> Result<RunSummary, MailError> {
        let query = SearchQuery::from_policy(&self.policy, Utc::now());
        let ids = store.search(&query)?;
        info!(criteria = %query.to_imap(), count = ids.len(), "Selected messages");

        let mut summary = RunSummary {
            selected: ids.len(),
            ..RunSummary::default()
        };

        for id in &ids {
            let outcome = self.process_message(store, id).await?;
            debug!(id = %id, ?outcome, "Message done");
            summary.record(outcome);
        }

        Ok(summary)
    }

    async fn process_message<S: MailStore>(
        &self,
        store: &mut S,
        id: &MessageId,
    ) -> Result<MessageOutcome, MailError> {
        let message = match store.fetch(id) {
            Ok(message) => message,
            Err(e @ (MailError::Transport(_) | MailError::Closed)) => return Err(e),
            Err(e) => {
                warn!(id = %id, "Skipping message: {e}");
                return Ok(MessageOutcome::FetchFailed);
            }
        };

        if !self.policy.matches(&message) {
            debug!(id = %id, subject = %message.subject, sender = %message.sender, "Filtered out");
            return Ok(MessageOutcome::FilteredOut);
        }

        let text = attachments::extract_text(&message);
        let details = match self.extractor.extract(&text, &message) {
            Ok(details) if !details.is_empty() => details,
            Ok(_) => {
                info!(id = %id, "No payment fields found; leaving message unread");
                return Ok(MessageOutcome::Empty);
            }
            Err(e @ ExtractError::NoRuleMatch { .. }) => {
                warn!(id = %id, "{e}");
                return Ok(MessageOutcome::Empty);
            }
            Err(e) => {
                error!(id = %id, "Extraction failed: {e}");
                return Ok(MessageOutcome::Empty);
            }
        };

        info!(id = %id, fields = details.fields.len(), "Extracted payment details");

        if !self.deliver(&details).await {
            return Ok(MessageOutcome::DeliveryFailed);
        }

        // Never fatal here; a dead connection surfaces on the next fetch.
        match store.mark_seen(id) {
            Ok(()) => Ok(MessageOutcome::Processed),
            Err(e) => {
                warn!(id = %id, "Delivered but could not mark as read: {e}");
                Ok(MessageOutcome::DeliveredUnmarked)
            }
        }
    }

    /// Hand the record to every sink. True only if all accepted it.
    async fn deliver(&self, details: &PaymentDetails) -> bool {
        let mut delivered = true;
        for sink in &self.sinks {
            if let Err(e) = sink.deliver(details).await {
                error!(id = %details.email_id, sink = sink.name(), "Delivery failed: {e}");
                delivered = false;
            }
        }
        delivered
    }
}
