//! Logged messages: one audit record per sent message and recipient.

mod backend;
mod factory;
mod memory_backend;
mod postgres_backend;
pub mod retention;
mod types;

pub use backend::{LogBackend, LogBackendError, LogResult};
pub use factory::create_log_backend;
pub use memory_backend::MemoryLogBackend;
pub use postgres_backend::PostgresLogBackend;
pub use retention::{truncate_logs, TruncateReport, DEFAULT_RETENTION_DAYS};
pub use types::LoggedMessage;
