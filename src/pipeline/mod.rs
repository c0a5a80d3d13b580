//! Payment extraction pipeline.

pub mod attachments;
pub mod filter;
pub mod processor;
pub mod rules;
pub mod types;

pub use filter::FilterPolicy;
pub use processor::PaymentProcessor;
pub use rules::{BankRules, FieldExtractor};
pub use types::{MessageOutcome, PaymentDetails, RunSummary};

use tracing::Span;

use crate::config::Config;
use crate::error::Error;
use crate::mail::{self, ImapSession};
use crate::sinks;

/// One full polling pass: connect, process the batch, log out.
///
/// Logout is attempted even when the batch aborts.
pub async fn run_once(config: &Config, span: Span) -> Result<RunSummary, Error> {
    let extractor = FieldExtractor::new(&config.parsing_rules)?;
    let processor = PaymentProcessor::new(
        config.filtering.clone(),
        extractor,
        sinks::build_sinks(&config.notifications),
        span.clone(),
    );

    let mut session = span.in_scope(|| ImapSession::connect(&config.email))?;
    let result = processor.run(&mut session).await;
    span.in_scope(|| mail::disconnect(Some(session)));

    Ok(result?)
}
