//! Sending composed messages and logging what was sent.

mod service;
mod types;

pub use service::{Mailer, MailerStats, MailerStatsSnapshot};
pub use types::{MailerError, MailerResult, SendOptions, TestSend, TestSendOutcome};
