//! PostgreSQL-based log backend.
//!
//! Table structure:
//! - `appmail_loggedmessage` - one row per sent message and recipient

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::backend::{LogBackend, LogResult};
use super::types::LoggedMessage;

const COLUMNS: &str =
    "id, recipient, user_id, template_id, template_name, subject, body, html, context, timestamp";

#[derive(sqlx::FromRow)]
struct LoggedMessageRow {
    id: Uuid,
    recipient: String,
    user_id: Option<i64>,
    template_id: Option<i64>,
    template_name: String,
    subject: String,
    body: String,
    html: String,
    context: serde_json::Value,
    timestamp: DateTime<Utc>,
}

impl From<LoggedMessageRow> for LoggedMessage {
    fn from(row: LoggedMessageRow) -> Self {
        LoggedMessage {
            id: row.id,
            to: row.recipient,
            user_id: row.user_id,
            template_id: row.template_id,
            template_name: row.template_name,
            subject: row.subject,
            body: row.body,
            html: row.html,
            context: match row.context {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            timestamp: row.timestamp,
        }
    }
}

/// PostgreSQL-based log backend
pub struct PostgresLogBackend {
    pool: PgPool,
}

impl PostgresLogBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LogBackend for PostgresLogBackend {
    async fn insert_batch(&self, messages: Vec<LoggedMessage>) -> LogResult<()> {
        let mut tx = self.pool.begin().await?;

        for message in &messages {
            sqlx::query(
                r#"
                INSERT INTO appmail_loggedmessage
                    (id, recipient, user_id, template_id, template_name, subject, body, html,
                     context, timestamp)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(message.id)
            .bind(&message.to)
            .bind(message.user_id)
            .bind(message.template_id)
            .bind(&message.template_name)
            .bind(&message.subject)
            .bind(&message.body)
            .bind(&message.html)
            .bind(serde_json::Value::Object(message.context.clone()))
            .bind(message.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::trace!(count = messages.len(), "Logged messages inserted into PostgreSQL");
        Ok(())
    }

    async fn get(&self, id: Uuid) -> LogResult<Option<LoggedMessage>> {
        let row: Option<LoggedMessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM appmail_loggedmessage WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(LoggedMessage::from))
    }

    async fn list(&self) -> LogResult<Vec<LoggedMessage>> {
        let rows: Vec<LoggedMessageRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM appmail_loggedmessage ORDER BY timestamp DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LoggedMessage::from).collect())
    }

    async fn for_recipient(&self, to: &str) -> LogResult<Vec<LoggedMessage>> {
        let rows: Vec<LoggedMessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM appmail_loggedmessage
            WHERE LOWER(recipient) = LOWER($1)
            ORDER BY timestamp DESC
            "#
        ))
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LoggedMessage::from).collect())
    }

    async fn for_template(&self, template_id: i64) -> LogResult<Vec<LoggedMessage>> {
        let rows: Vec<LoggedMessageRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM appmail_loggedmessage
            WHERE template_id = $1
            ORDER BY timestamp DESC
            "#
        ))
        .bind(template_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(LoggedMessage::from).collect())
    }

    async fn count_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM appmail_loggedmessage WHERE timestamp < $1")
                .bind(cutoff)
                .fetch_one(&self.pool)
                .await?;

        Ok(count as u64)
    }

    async fn delete_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
        let result = sqlx::query("DELETE FROM appmail_loggedmessage WHERE timestamp < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn detach_template(&self, template_id: i64) -> LogResult<u64> {
        let result =
            sqlx::query("UPDATE appmail_loggedmessage SET template_id = NULL WHERE template_id = $1")
                .bind(template_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
