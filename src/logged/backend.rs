//! Backend trait for logged message storage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::types::LoggedMessage;

/// Errors that can occur during log backend operations.
#[derive(Debug, Error)]
pub enum LogBackendError {
    /// PostgreSQL operation failed
    #[error("PostgreSQL error: {0}")]
    Postgres(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend rejected the write
    #[error("Backend unavailable: {0}")]
    Unavailable(String),

    /// Caller supplied an argument the operation cannot use
    #[error("{0}")]
    InvalidArgument(String),
}

/// Result type for log backend operations
pub type LogResult<T> = Result<T, LogBackendError>;

/// Storage for `LoggedMessage` records
#[async_trait]
pub trait LogBackend: Send + Sync {
    /// Insert every record or none of them
    async fn insert_batch(&self, messages: Vec<LoggedMessage>) -> LogResult<()>;

    async fn get(&self, id: Uuid) -> LogResult<Option<LoggedMessage>>;

    /// All records, newest first
    async fn list(&self) -> LogResult<Vec<LoggedMessage>>;

    /// Records sent to an address (case-insensitive), newest first
    async fn for_recipient(&self, to: &str) -> LogResult<Vec<LoggedMessage>>;

    /// Records sent from a template, newest first
    async fn for_template(&self, template_id: i64) -> LogResult<Vec<LoggedMessage>>;

    /// Number of records with a timestamp strictly before `cutoff`
    async fn count_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64>;

    /// Delete records with a timestamp strictly before `cutoff`
    async fn delete_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64>;

    /// Clear the template reference on every record pointing at `template_id`
    async fn detach_template(&self, template_id: i64) -> LogResult<u64>;

    /// Get the backend type name (for logging/debugging)
    fn backend_type(&self) -> &'static str;
}
