//! Template backend factory

use std::sync::Arc;

use crate::config::{StorageBackend, StorageConfig};
use crate::postgres::PostgresPool;

use super::backend::TemplateBackend;
use super::memory_backend::MemoryTemplateBackend;
use super::postgres_backend::PostgresTemplateBackend;

/// Create a template backend based on configuration.
///
/// - `postgres`: a `PostgresTemplateBackend` if a pool is provided
/// - `memory` (default): a `MemoryTemplateBackend`
pub fn create_template_backend(
    settings: &StorageConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn TemplateBackend> {
    match settings.backend {
        StorageBackend::Postgres => {
            if let Some(pool) = postgres_pool {
                tracing::info!(backend = "postgres", "Creating PostgreSQL template backend");
                Arc::new(PostgresTemplateBackend::new(pool.pool().clone()))
            } else {
                tracing::warn!(
                    "PostgreSQL backend requested but no pool provided, falling back to memory"
                );
                Arc::new(MemoryTemplateBackend::new())
            }
        }
        StorageBackend::Memory => {
            tracing::info!(backend = "memory", "Creating memory template backend");
            Arc::new(MemoryTemplateBackend::new())
        }
    }
}
