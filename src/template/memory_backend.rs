//! In-memory template backend using DashMap.
//!
//! Templates are lost on restart. Used by tests and by the CLI when no
//! database is configured.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Mutex;

use super::backend::TemplateBackend;
use super::types::{EmailTemplate, TemplateError, TemplateResult};

/// In-memory template storage.
///
/// Writes are serialized through `write_lock` so the uniqueness check and
/// the insert happen as one step.
pub struct MemoryTemplateBackend {
    templates: DashMap<i64, EmailTemplate>,
    next_id: AtomicI64,
    write_lock: Mutex<()>,
}

impl Default for MemoryTemplateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTemplateBackend {
    pub fn new() -> Self {
        Self {
            templates: DashMap::new(),
            next_id: AtomicI64::new(1),
            write_lock: Mutex::new(()),
        }
    }

    fn key_taken(&self, template: &EmailTemplate) -> bool {
        self.templates.iter().any(|entry| {
            let other = entry.value();
            other.id != template.id
                && other.name == template.name
                && other.language == template.language
                && other.version == template.version
        })
    }

    fn sorted(mut templates: Vec<EmailTemplate>) -> Vec<EmailTemplate> {
        templates.sort_by(|a, b| {
            (&a.name, &a.language, a.version).cmp(&(&b.name, &b.language, b.version))
        });
        templates
    }
}

#[async_trait]
impl TemplateBackend for MemoryTemplateBackend {
    async fn insert(&self, mut template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        let _guard = self.write_lock.lock().await;

        template.id = 0;
        if self.key_taken(&template) {
            return Err(TemplateError::UniquenessConflict(template.key()));
        }

        template.id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.templates.insert(template.id, template.clone());

        tracing::trace!(id = template.id, key = %template.key(), "Template inserted");
        Ok(template)
    }

    async fn update(&self, mut template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        let _guard = self.write_lock.lock().await;

        if !self.templates.contains_key(&template.id) {
            return Err(TemplateError::NotFound(template.id.to_string()));
        }
        if self.key_taken(&template) {
            return Err(TemplateError::UniquenessConflict(template.key()));
        }

        template.updated_at = Utc::now();
        self.templates.insert(template.id, template.clone());
        Ok(template)
    }

    async fn get(&self, id: i64) -> TemplateResult<Option<EmailTemplate>> {
        Ok(self.templates.get(&id).map(|t| t.clone()))
    }

    async fn find_version(
        &self,
        name: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<Option<EmailTemplate>> {
        Ok(self
            .templates
            .iter()
            .find(|entry| {
                let t = entry.value();
                t.name == name && t.language == language && t.version == version
            })
            .map(|entry| entry.value().clone()))
    }

    async fn current(&self, name: &str, language: &str) -> TemplateResult<Option<EmailTemplate>> {
        Ok(self
            .templates
            .iter()
            .filter(|entry| {
                let t = entry.value();
                t.is_active && t.name == name && t.language == language
            })
            .max_by_key(|entry| entry.value().version)
            .map(|entry| entry.value().clone()))
    }

    async fn list(&self) -> TemplateResult<Vec<EmailTemplate>> {
        Ok(Self::sorted(
            self.templates.iter().map(|e| e.value().clone()).collect(),
        ))
    }

    async fn active(&self) -> TemplateResult<Vec<EmailTemplate>> {
        Ok(Self::sorted(
            self.templates
                .iter()
                .filter(|e| e.value().is_active)
                .map(|e| e.value().clone())
                .collect(),
        ))
    }

    async fn delete(&self, id: i64) -> TemplateResult<bool> {
        let _guard = self.write_lock.lock().await;
        Ok(self.templates.remove(&id).is_some())
    }

    fn backend_type(&self) -> &'static str {
        "memory"
    }
}
