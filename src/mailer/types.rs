//! Mailer types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::logged::LogBackendError;
use crate::message::{AddressList, MessageError};
use crate::template::{Context, TemplateError};
use crate::transport::TransportError;

/// Mailer error type
#[derive(Debug, Error)]
pub enum MailerError {
    #[error(transparent)]
    Message(#[from] MessageError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Failed to send message: {0}")]
    TransportFailure(#[from] TransportError),

    #[error("Failed to log sent message: {0}")]
    Log(#[from] LogBackendError),

    #[error("Logged message {0} no longer has a template")]
    MissingTemplate(Uuid),
}

/// Result type for mailer operations
pub type MailerResult<T> = Result<T, MailerError>;

/// Per-send options
#[derive(Debug, Clone, Copy, Default)]
pub struct SendOptions {
    /// Override the configured `log_sent_emails` flag
    pub log_sent_emails: Option<bool>,
    /// Report transport failures as zero sent instead of an error
    pub fail_silently: bool,
}

impl SendOptions {
    pub fn log_sent_emails(mut self, log: bool) -> Self {
        self.log_sent_emails = Some(log);
        self
    }

    pub fn fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = fail_silently;
        self
    }
}

/// Envelope and context for sending test emails
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TestSend {
    pub context: Context,
    pub from_email: Option<String>,
    pub reply_to: Option<AddressList>,
    pub to: AddressList,
    pub cc: AddressList,
    pub bcc: AddressList,
}

/// Result of a test send for one template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestSendOutcome {
    pub template_id: i64,
    pub template_name: String,
    pub success: bool,
    /// Human readable summary
    pub message: String,
}

impl TestSendOutcome {
    pub(crate) fn sent(template_id: i64, template_name: &str, to: &[String]) -> Self {
        Self {
            template_id,
            template_name: template_name.to_string(),
            success: true,
            message: format!("'{}' email sent to '{}'", template_name, to.join(", ")),
        }
    }

    pub(crate) fn failed(template_id: i64, template_name: &str, error: &MailerError) -> Self {
        Self {
            template_id,
            template_name: template_name.to_string(),
            success: false,
            message: format!("Error sending test email '{}': {}", template_name, error),
        }
    }
}
