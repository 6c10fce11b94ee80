//! PostgreSQL user directory over an existing users table

use async_trait::async_trait;
use sqlx::PgPool;

use super::UserDirectory;

/// Looks users up in a table with `id BIGINT` and `email` columns
pub struct PostgresUserDirectory {
    pool: PgPool,
    query: String,
}

impl PostgresUserDirectory {
    /// Returns `None` if `table` is not a plain (optionally schema qualified)
    /// identifier.
    pub fn new(pool: PgPool, table: &str) -> Option<Self> {
        if !is_identifier(table) {
            return None;
        }

        Some(Self {
            pool,
            query: format!(
                "SELECT id FROM {} WHERE LOWER(email) = LOWER($1) LIMIT 2",
                table
            ),
        })
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.split('.').all(|part| {
            let mut chars = part.chars();
            matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn find_by_email(&self, email: &str) -> Option<i64> {
        let rows: Vec<(i64,)> = match sqlx::query_as(&self.query)
            .bind(email.trim())
            .fetch_all(&self.pool)
            .await
        {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "User lookup failed");
                return None;
            }
        };

        match rows.as_slice() {
            [(id,)] => Some(*id),
            _ => None,
        }
    }

    fn directory_type(&self) -> &'static str {
        "postgres"
    }
}
