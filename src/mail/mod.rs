//! Mail store access: the IMAP session and the trait the pipeline drives.

pub mod imap;
pub mod message;
pub mod search;

pub use imap::{ImapSession, disconnect};
pub use message::{MessageId, RawMessage};
pub use search::SearchQuery;

use crate::error::MailError;

/// Operations the pipeline needs from a selected mailbox.
///
/// [`ImapSession`] is the real implementation; tests drive the pipeline
/// through an in-memory store.
pub trait MailStore {
    /// Run a server-side search. Zero hits is `Ok(vec![])`.
    fn search(&mut self, query: &SearchQuery) -> Result<Vec<MessageId>, MailError>;

    /// Fetch and decode one message.
    fn fetch(&mut self, id: &MessageId) -> Result<RawMessage, MailError>;

    /// Set the `\Seen` flag on one message.
    fn mark_seen(&mut self, id: &MessageId) -> Result<(), MailError>;

    /// End the session. Consumes the store, so nothing can follow it.
    fn logout(self) -> Result<(), MailError>
    where
        Self: Sized;
}
