//! Mapping recipient addresses onto user accounts.
//!
//! Lookups are best effort: a recipient maps to a user only when exactly
//! one account has that email address (compared case-insensitively).

mod memory;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{DatabaseConfig, StorageBackend, StorageConfig};
use crate::postgres::PostgresPool;

pub use memory::MemoryUserDirectory;
pub use postgres::PostgresUserDirectory;

/// User lookup by email address
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Id of the single user with this address; `None` when absent or ambiguous
    async fn find_by_email(&self, email: &str) -> Option<i64>;

    /// Get the directory type name (for logging/debugging)
    fn directory_type(&self) -> &'static str;
}

/// Create a user directory based on configuration.
///
/// Falls back to an empty memory directory when Postgres is requested
/// without a pool, or the configured users table name is not a valid
/// identifier.
pub fn create_user_directory(
    settings: &StorageConfig,
    database: &DatabaseConfig,
    postgres_pool: Option<Arc<PostgresPool>>,
) -> Arc<dyn UserDirectory> {
    match (settings.backend, postgres_pool) {
        (StorageBackend::Postgres, Some(pool)) => {
            match PostgresUserDirectory::new(pool.pool().clone(), &database.users_table) {
                Some(directory) => {
                    tracing::info!(
                        backend = "postgres",
                        table = %database.users_table,
                        "Creating PostgreSQL user directory"
                    );
                    Arc::new(directory)
                }
                None => {
                    tracing::warn!(
                        table = %database.users_table,
                        "Invalid users table name, falling back to memory"
                    );
                    Arc::new(MemoryUserDirectory::new())
                }
            }
        }
        (StorageBackend::Postgres, None) => {
            tracing::warn!(
                "PostgreSQL backend requested but no pool provided, falling back to memory"
            );
            Arc::new(MemoryUserDirectory::new())
        }
        (StorageBackend::Memory, _) => {
            tracing::info!(backend = "memory", "Creating memory user directory");
            Arc::new(MemoryUserDirectory::new())
        }
    }
}
