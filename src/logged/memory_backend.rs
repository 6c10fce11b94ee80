//! In-memory log backend.
//!
//! Records are lost on restart.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::backend::{LogBackend, LogBackendError, LogResult};
use super::types::LoggedMessage;

/// Log backend keeping records in a map behind a single lock, so a batch
/// becomes visible all at once.
#[derive(Default)]
pub struct MemoryLogBackend {
    messages: RwLock<HashMap<Uuid, LoggedMessage>>,
}

impl MemoryLogBackend {
    pub fn new() -> Self {
        Self::default()
    }

    async fn select<F>(&self, filter: F) -> Vec<LoggedMessage>
    where
        F: Fn(&LoggedMessage) -> bool,
    {
        let messages = self.messages.read().await;
        let mut selected: Vec<LoggedMessage> =
            messages.values().filter(|m| filter(m)).cloned().collect();
        selected.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        selected
    }
}

#[async_trait]
impl LogBackend for MemoryLogBackend {
    async fn insert_batch(&self, batch: Vec<LoggedMessage>) -> LogResult<()> {
        let mut messages = self.messages.write().await;
        if let Some(duplicate) = batch.iter().find(|m| messages.contains_key(&m.id)) {
            return Err(LogBackendError::Unavailable(format!(
                "duplicate logged message id {}",
                duplicate.id
            )));
        }

        for message in batch {
            messages.insert(message.id, message);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> LogResult<Option<LoggedMessage>> {
        Ok(self.messages.read().await.get(&id).cloned())
    }

    async fn list(&self) -> LogResult<Vec<LoggedMessage>> {
        Ok(self.select(|_| true).await)
    }

    async fn for_recipient(&self, to: &str) -> LogResult<Vec<LoggedMessage>> {
        Ok(self.select(|m| m.to.eq_ignore_ascii_case(to)).await)
    }

    async fn for_template(&self, template_id: i64) -> LogResult<Vec<LoggedMessage>> {
        Ok(self.select(|m| m.template_id == Some(template_id)).await)
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
        let messages = self.messages.read().await;
        Ok(messages.values().filter(|m| m.timestamp < cutoff).count() as u64)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
        let mut messages = self.messages.write().await;
        let before = messages.len();
        messages.retain(|_, m| m.timestamp >= cutoff);
        Ok((before - messages.len()) as u64)
    }

    async fn detach_template(&self, template_id: i64) -> LogResult<u64> {
        let mut messages = self.messages.write().await;
        let mut detached = 0;
        for message in messages.values_mut() {
            if message.template_id == Some(template_id) {
                message.template_id = None;
                detached += 1;
            }
        }
        Ok(detached)
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
