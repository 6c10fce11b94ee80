//! Mail transports.
//!
//! A transport delivers a [`ComposedMessage`] and reports how many envelope
//! recipients were accepted. Messages without any recipient are not sent and
//! report zero.

mod memory;
mod smtp;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::{MailBackend, MailConfig, SmtpConfig};
use crate::message::ComposedMessage;

pub use memory::MemoryTransport;
pub use smtp::SmtpTransport;

/// Transport error type
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("Invalid address: {0}")]
    Address(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("Transport configuration error: {0}")]
    Config(String),
}

/// Delivers composed messages
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send a message, returning the number of accepted recipients
    async fn send(&self, message: &ComposedMessage) -> Result<usize, TransportError>;

    /// Get the transport type name (for logging/debugging)
    fn transport_type(&self) -> &'static str;
}

/// Create a mail transport based on configuration.
///
/// - `smtp` (default): an `SmtpTransport` built from the `smtp` section
/// - `memory`: a `MemoryTransport` that keeps messages in-process
pub fn create_mail_transport(
    mail: &MailConfig,
    smtp: &SmtpConfig,
) -> Result<Arc<dyn MailTransport>, TransportError> {
    match mail.backend {
        MailBackend::Smtp => {
            tracing::info!(
                transport = "smtp",
                host = %smtp.host,
                port = smtp.port,
                "Creating SMTP transport"
            );
            Ok(Arc::new(SmtpTransport::new(smtp)?))
        }
        MailBackend::Memory => {
            tracing::info!(transport = "memory", "Creating memory transport");
            Ok(Arc::new(MemoryTransport::new()))
        }
    }
}
