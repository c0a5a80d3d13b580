//! Server-side search expression.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::pipeline::filter::FilterPolicy;

/// Flag and date criteria for `UID SEARCH`.
///
/// IMAP `SINCE` only has day granularity, so a time window is widened to
/// the start of the UTC day it begins in; the client never narrows it back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub unseen: bool,
    pub since: Option<NaiveDate>,
}

impl SearchQuery {
    pub fn all() -> Self {
        Self {
            unseen: false,
            since: None,
        }
    }

    /// Derive criteria from the filter policy.
    ///
    /// When a time window and `fetch_unread_only` are both set, both apply
    /// (`UNSEEN SINCE <date>`): a window never resurrects messages already
    /// marked processed.
    pub fn from_policy(policy: &FilterPolicy, now: DateTime<Utc>) -> Self {
        let since = policy
            .time_window_minutes
            .map(|minutes| (now - Duration::minutes(i64::from(minutes))).date_naive());

        Self {
            unseen: policy.fetch_unread_only,
            since,
        }
    }

    /// Render the criteria as IMAP search keys.
    pub fn to_imap(&self) -> String {
        let mut keys = Vec::new();
        if self.unseen {
            keys.push("UNSEEN".to_string());
        }
        if let Some(date) = self.since {
            keys.push(format!("SINCE {}", imap_date(date)));
        }
        if keys.is_empty() {
            "ALL".to_string()
        } else {
            keys.join(" ")
        }
    }
}

/// `date` in RFC 3501 form, e.g. `5-Mar-2025`.
pub fn imap_date(date: NaiveDate) -> String {
    date.format("%-d-%b-%Y").to_string()
}
