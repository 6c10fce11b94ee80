//! Backend trait for template storage.
//!
//! Storage implementations (memory, PostgreSQL) enforce the uniqueness of
//! (name, language, version) themselves; the store never locks.

use async_trait::async_trait;

use super::types::{EmailTemplate, TemplateResult};

/// Backend trait for template storage.
///
/// # Thread Safety
///
/// Implementations must be thread-safe (`Send + Sync`) as they are shared
/// across tasks behind an `Arc`.
#[async_trait]
pub trait TemplateBackend: Send + Sync {
    /// Insert a new template and return it with its assigned id.
    ///
    /// Fails with `TemplateError::UniquenessConflict` if the
    /// (name, language, version) combination already exists.
    async fn insert(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate>;

    /// Replace an existing template.
    ///
    /// Fails with `NotFound` for an unknown id and `UniquenessConflict` if
    /// the new key collides with another record.
    async fn update(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate>;

    /// Get a template by id.
    async fn get(&self, id: i64) -> TemplateResult<Option<EmailTemplate>>;

    /// Get an exact (name, language, version) match.
    async fn find_version(
        &self,
        name: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<EmailTemplate>>;

    /// Highest version among active templates for name/language.
    async fn current(&self, name: &str, language: &str) -> TemplateResult<Option<EmailTemplate>>;

    /// All templates ordered by name, language, version.
    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>>;

    /// Active templates ordered by name, language, version.
    async fn active(&self) -> TemplateResult<Vec<EmailTemplate>>;

    /// Delete a template, returning whether it existed.
    async fn delete(&self, id: i64) -> TemplateResult<bool>;

    /// Get the backend type name (for logging/debugging).
    fn backend_type(&self) -> &'static str;
}
