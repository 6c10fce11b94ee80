//! Log backend factory

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::postgres::PostgresPool;

use super::backend::LogBackend;
use super::memory_backend::MemoryLogBackend;
use super::postgres_backend::PostgresLogBackend;

/// Create a log backend based on configuration.
///
/// - `postgres`: a `PostgresLogBackend` if a pool is provided
/// - `memory` (default): a `MemoryLogBackend`
pub fn create_log_backend(
    settings: &StorageConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn LogBackend> {
    match settings.backend {
        StorageBackend::Postgres => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL log backend");
                Arc::new(PostgresLogBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryLogBackend::new())
            }
        }
        StorageBackend::Memory => {
            tracing::info!(backend = "memory", "Creating memory log backend");
            Arc::new(MemoryLogBackend::new())
        }
    }
}
