//! PostgreSQL-based template backend.
//!
//! Uniqueness of (name, language, version) is enforced by a table
//! constraint; violations are reported as `UniquenessConflict`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::backend::TemplateBackend;
use super::types::{EmailTemplate, TemplateError, TemplateResult};

const COLUMNS: &str = "id, name, description, language, version, subject, body_text, body_html, \
     from_email, reply_to, is_active, supports_attachments, test_context, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct TemplateRow {
    id: i64,
    name: String,
    description: String,
    language: String,
    version: i32,
    subject: String,
    body_text: String,
    body_html: String,
    from_email: String,
    reply_to: String,
    is_active: bool,
    supports_attachments: bool,
    test_context: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TemplateRow> for EmailTemplate {
    fn from(row: TemplateRow) -> Self {
        EmailTemplate {
            id: row.id,
            name: row.name,
            description: row.description,
            language: row.language,
            version: row.version,
            subject: row.subject,
            body_text: row.body_text,
            body_html: row.body_html,
            from_email: row.from_email,
            reply_to: row.reply_to,
            is_active: row.is_active,
            supports_attachments: row.supports_attachments,
            test_context: match row.test_context {
                serde_json::Value::Object(map) => map,
                _ => serde_json::Map::new(),
            },
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// PostgreSQL-based template backend.
///
/// Table structure:
/// - `appmail_emailtemplate` - one row per template version
pub struct PostgresTemplateBackend {
    pool: PgPool,
}

impl PostgresTemplateBackend {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn map_write_error(err: sqlx::Error, template: &EmailTemplate) -> TemplateError {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                TemplateError::UniquenessConflict(template.key())
            }
            _ => TemplateError::Storage(err.to_string()),
        }
    }
}

#[async_trait]
impl TemplateBackend for PostgresTemplateBackend {
    async fn insert(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        let row: TemplateRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO appmail_emailtemplate
                (name, description, language, version, subject, body_text, body_html,
                 from_email, reply_to, is_active, supports_attachments, test_context,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            RETURNING {COLUMNS}
            "#
        ))
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.language)
        .bind(template.version)
        .bind(&template.subject)
        .bind(&template.body_text)
        .bind(&template.body_html)
        .bind(&template.from_email)
        .bind(&template.reply_to)
        .bind(template.is_active)
        .bind(template.supports_attachments)
        .bind(serde_json::Value::Object(template.test_context.clone()))
        .bind(template.created_at)
        .bind(template.updated_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, &template))?;

        tracing::trace!(id = row.id, key = %template.key(), "Template inserted into PostgreSQL");
        Ok(row.into())
    }

    async fn update(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            r#"
            UPDATE appmail_emailtemplate SET
                name = $2, description = $3, language = $4, version = $5, subject = $6,
                body_text = $7, body_html = $8, from_email = $9, reply_to = $10,
                is_active = $11, supports_attachments = $12, test_context = $13,
                updated_at = NOW()
            WHERE id = $1
            RETURNING {COLUMNS}
            "#
        ))
        .bind(template.id)
        .bind(&template.name)
        .bind(&template.description)
        .bind(&template.language)
        .bind(template.version)
        .bind(&template.subject)
        .bind(&template.body_text)
        .bind(&template.body_html)
        .bind(&template.from_email)
        .bind(&template.reply_to)
        .bind(template.is_active)
        .bind(template.supports_attachments)
        .bind(serde_json::Value::Object(template.test_context.clone()))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| Self::map_write_error(e, &template))?;

        row.map(EmailTemplate::from)
            .ok_or_else(|| TemplateError::NotFound(template.id.to_string()))
    }

    async fn get(&self, id: i64) -> TemplateResult<Option<EmailTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM appmail_emailtemplate WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailTemplate::from))
    }

    async fn find_version(
        &self,
        name: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<EmailTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM appmail_emailtemplate
            WHERE name = $1 AND language = $2 AND version = $3
            "#
        ))
        .bind(name)
        .bind(language)
        .bind(version)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailTemplate::from))
    }

    async fn current(&self, name: &str, language: &str) -> TemplateResult<Option<EmailTemplate>> {
        let row: Option<TemplateRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM appmail_emailtemplate
            WHERE name = $1 AND language = $2 AND is_active
            ORDER BY version DESC
            LIMIT 1
            "#
        ))
        .bind(name)
        .bind(language)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(EmailTemplate::from))
    }

    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            "SELECT {COLUMNS} FROM appmail_emailtemplate ORDER BY name, language, version"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmailTemplate::from).collect())
    }

    async fn active(&self) -> TemplateResult<Vec<EmailTemplate>> {
        let rows: Vec<TemplateRow> = sqlx::query_as(&format!(
            r#"
            SELECT {COLUMNS} FROM appmail_emailtemplate
            WHERE is_active
            ORDER BY name, language, version
            "#
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(EmailTemplate::from).collect())
    }

    async fn delete(&self, id: i64) -> TemplateResult<bool> {
        let result = sqlx::query("DELETE FROM appmail_emailtemplate WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    fn backend_type(&self) -> &'static str {
        "postgres"
    }
}
