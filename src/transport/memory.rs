//! In-process transport for tests and dry runs

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::message::ComposedMessage;

use super::{MailTransport, TransportError};

/// Transport that appends every sent message to an outbox
#[derive(Default)]
pub struct MemoryTransport {
    outbox: Mutex<Vec<ComposedMessage>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the messages sent so far
    pub async fn outbox(&self) -> Vec<ComposedMessage> {
        self.outbox.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.outbox.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.outbox.lock().await.is_empty()
    }

    /// Drop all stored messages
    pub async fn clear(&self) {
        self.outbox.lock().await.clear();
    }
}

#[async_trait]
impl MailTransport for MemoryTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<usize, TransportError> {
        let recipients = message.recipients().count();
        if recipients == 0 {
            return Ok(0);
        }

        self.outbox.lock().await.push(message.clone());
        tracing::debug!(
            subject = %message.subject(),
            recipients = recipients,
            "Message stored in memory outbox"
        );
        Ok(recipients)
    }

    fn transport_type(&self) -> &'static str {
        "memory"
    }
}
