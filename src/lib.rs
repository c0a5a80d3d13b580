//! Payment Watch turns bank receipt emails into payment notifications.

pub mod config;
pub mod echo;
pub mod error;
pub mod logging;
pub mod mail;
pub mod pipeline;
pub mod sinks;
