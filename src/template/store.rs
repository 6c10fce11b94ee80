//! Template store: creation, versioning and lookup on top of a backend

use std::sync::Arc;

use crate::config::AppmailConfig;

use super::backend::TemplateBackend;
use super::context::build_sample_context;
use super::memory_backend::MemoryTemplateBackend;
use super::render::Renderer;
use super::types::{EmailTemplate, NewTemplate, TemplateError, TemplateResult, ValidationErrors};

/// Templates split by whether they pass `Renderer::clean`
#[derive(Debug, Default)]
pub struct TemplateValidity {
    pub valid: Vec<EmailTemplate>,
    pub invalid: Vec<(EmailTemplate, ValidationErrors)>,
}

/// Template store
pub struct TemplateStore {
    backend: Arc<dyn TemplateBackend>,
    renderer: Renderer,
    config: AppmailConfig,
}

impl TemplateStore {
    /// Create a template store over the given backend
    pub fn new(backend: Arc<dyn TemplateBackend>, renderer: Renderer, config: AppmailConfig) -> Self {
        Self {
            backend,
            renderer,
            config,
        }
    }

    /// In-memory store with the default renderer
    pub fn in_memory(config: AppmailConfig) -> Self {
        let renderer = Renderer::from_config(&config);
        Self::new(Arc::new(MemoryTemplateBackend::new()), renderer, config)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    pub fn config(&self) -> &AppmailConfig {
        &self.config
    }

    pub fn backend(&self) -> &Arc<dyn TemplateBackend> {
        &self.backend
    }

    /// Create a new template.
    ///
    /// The test context is derived from the subject and both bodies unless
    /// one is supplied. It is only ever derived here, on first save; later
    /// edits keep whatever context the record already has.
    pub async fn create(&self, new: NewTemplate) -> TemplateResult<EmailTemplate> {
        let derive_context = new.test_context.is_none();
        let mut template = new.into_template(&self.config);
        if derive_context {
            template.test_context = build_sample_context(&template.content());
        }
        self.insert(template, self.config.validate_on_save).await
    }

    /// Save changes to an existing template, validating per configuration
    pub async fn save(&self, template: EmailTemplate) -> TemplateResult<EmailTemplate> {
        self.save_with(template, self.config.validate_on_save).await
    }

    /// Save changes to an existing template with an explicit validation choice
    pub async fn save_with(
        &self,
        template: EmailTemplate,
        validate: bool,
    ) -> TemplateResult<EmailTemplate> {
        template.validate_fields()?;
        if validate {
            self.renderer.clean(&template)?;
        }

        let saved = self.backend.update(template).await?;
        tracing::info!(id = saved.id, template = %saved.key(), "Template saved");
        Ok(saved)
    }

    /// Get a template by id
    pub async fn get(&self, id: i64) -> TemplateResult<EmailTemplate> {
        self.backend
            .get(id)
            .await?
            .ok_or_else(|| TemplateError::NotFound(id.to_string()))
    }

    /// Most recent active version of a template, if any
    pub async fn get_current(
        &self,
        name: &str,
        language: &str,
    ) -> TemplateResult<Option<EmailTemplate>> {
        self.backend.current(name, language).await
    }

    /// A specific version of a template
    pub async fn get_version(
        &self,
        name: &str,
        language: &str,
        version: i32,
    ) -> TemplateResult<EmailTemplate> {
        self.backend
            .find_version(name, language, version)
            .await?
            .ok_or_else(|| TemplateError::NotFound(format!("{}:{}.{}", name, language, version)))
    }

    /// Copy a template into a new, inactive record one version higher.
    ///
    /// The original record is left untouched.
    pub async fn clone_template(&self, template: &EmailTemplate) -> TemplateResult<EmailTemplate> {
        let mut clone = template.clone();
        clone.id = 0;
        clone.version = template.version.checked_add(1).ok_or_else(|| {
            TemplateError::InvalidArgument(format!(
                "Template {} is at the highest version",
                template.key()
            ))
        })?;
        clone.is_active = false;
        clone.test_context = build_sample_context(&clone.content());

        let clone = self.insert(clone, self.config.validate_on_save).await?;
        tracing::info!(
            source = %template.key(),
            clone = %clone.key(),
            "Template cloned"
        );
        Ok(clone)
    }

    /// All templates
    pub async fn list(&self) -> TemplateResult<Vec<EmailTemplate>> {
        self.backend.list().await
    }

    /// Active templates
    pub async fn active(&self) -> TemplateResult<Vec<EmailTemplate>> {
        self.backend.active().await
    }

    /// Delete a template by id
    pub async fn delete(&self, id: i64) -> TemplateResult<()> {
        if self.backend.delete(id).await? {
            tracing::info!(id = id, "Template deleted");
            Ok(())
        } else {
            Err(TemplateError::NotFound(id.to_string()))
        }
    }

    /// Split templates into those that render cleanly and those that don't.
    ///
    /// Fatal render errors are not a validity verdict and are returned.
    pub fn validity(&self, templates: Vec<EmailTemplate>) -> TemplateResult<TemplateValidity> {
        let mut validity = TemplateValidity::default();
        for template in templates {
            match self.renderer.clean(&template) {
                Ok(()) => validity.valid.push(template),
                Err(TemplateError::Validation(errors)) => validity.invalid.push((template, errors)),
                Err(e) => return Err(e),
            }
        }
        Ok(validity)
    }

    async fn insert(&self, template: EmailTemplate, validate: bool) -> TemplateResult<EmailTemplate> {
        template.validate_fields()?;
        if validate {
            self.renderer.clean(&template)?;
        }

        let created = self.backend.insert(template).await?;
        tracing::info!(id = created.id, template = %created.key(), "Template created");
        Ok(created)
    }
}

/// Create an Arc-wrapped in-memory template store
pub fn create_template_store(config: AppmailConfig) -> Arc<TemplateStore> {
    Arc::new(TemplateStore::in_memory(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{Context, Escape, RenderError, TemplateEngine};
    use serde_json::json;

    fn store() -> TemplateStore {
        TemplateStore::in_memory(AppmailConfig::default())
    }

    fn welcome() -> NewTemplate {
        NewTemplate::named("welcome")
            .subject("Welcome {{ first_name }}")
            .body_text("Hello {{ first_name }} from {{ company.name }}")
            .body_html("<h1>Hello {{ first_name }}</h1>")
    }

    #[tokio::test]
    async fn test_create_derives_test_context() {
        let store = store();
        let template = store.create(welcome()).await.unwrap();

        assert_eq!(
            serde_json::Value::Object(template.test_context),
            json!({"first_name": "FIRST_NAME", "company": {"name": "NAME"}})
        );
    }

    #[tokio::test]
    async fn test_create_keeps_explicit_test_context() {
        let store = store();
        let mut new = welcome();
        new.test_context = json!({"first_name": "Fred"}).as_object().cloned();

        let template = store.create(new).await.unwrap();
        assert_eq!(template.test_context["first_name"], "Fred");
    }

    #[tokio::test]
    async fn test_save_does_not_regenerate_test_context() {
        let store = store();
        let mut template = store.create(welcome()).await.unwrap();
        let original_context = template.test_context.clone();

        template.subject = "Welcome {{ nickname }}".to_string();
        let saved = store.save(template).await.unwrap();

        assert_eq!(saved.test_context, original_context);
        assert!(!saved.test_context.contains_key("nickname"));
    }

    #[tokio::test]
    async fn test_create_validates_on_save() {
        let store = store();
        let result = store
            .create(NewTemplate::named("broken").subject("Hi {{ name"))
            .await;
        assert!(matches!(result, Err(TemplateError::Validation(_))));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validation_can_be_disabled() {
        let config = AppmailConfig {
            validate_on_save: false,
            ..Default::default()
        };
        let store = TemplateStore::in_memory(config);
        let mut template = store
            .create(NewTemplate::named("broken").subject("Hi {{ name"))
            .await
            .unwrap();

        let enforcing = TemplateStore::new(
            store.backend().clone(),
            Renderer::default(),
            AppmailConfig::default(),
        );
        template.description = "still broken".to_string();
        assert!(matches!(
            enforcing.save(template.clone()).await,
            Err(TemplateError::Validation(_))
        ));
        assert!(enforcing.save_with(template, false).await.is_ok());
    }

    #[tokio::test]
    async fn test_create_duplicate_conflicts() {
        let store = store();
        store.create(welcome()).await.unwrap();
        assert!(matches!(
            store.create(welcome()).await,
            Err(TemplateError::UniquenessConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_get_current() {
        let store = store();
        // Insert out of order: the highest version wins, not the latest insert
        store
            .create(NewTemplate::named("test").version(1))
            .await
            .unwrap();
        store
            .create(NewTemplate::named("test").version(0))
            .await
            .unwrap();
        store
            .create(NewTemplate::named("test").version(2).active(false))
            .await
            .unwrap();

        let current = store.get_current("test", "en-us").await.unwrap().unwrap();
        assert_eq!(current.version, 1);
        assert!(store.get_current("test", "klingon").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_current_inactive_only() {
        let store = store();
        store
            .create(NewTemplate::named("draft").active(false))
            .await
            .unwrap();
        assert!(store.get_current("draft", "en-us").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_version() {
        let store = store();
        let v1 = store
            .create(NewTemplate::named("test").version(1))
            .await
            .unwrap();
        let v0 = store
            .create(NewTemplate::named("test").version(0))
            .await
            .unwrap();

        assert_eq!(store.get_version("test", "en-us", 1).await.unwrap(), v1);
        assert_eq!(store.get_version("test", "en-us", 0).await.unwrap(), v0);
        assert!(matches!(
            store.get_version("test", "en-us", 5).await,
            Err(TemplateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_clone_template() {
        let store = store();
        let template = store.create(welcome()).await.unwrap();
        let clone = store.clone_template(&template).await.unwrap();

        assert_eq!(clone.name, template.name);
        assert_eq!(clone.language, template.language);
        assert_eq!(clone.subject, template.subject);
        assert_eq!(clone.body_html, template.body_html);
        assert_eq!(clone.version, 1);
        assert!(!clone.is_active);
        assert_ne!(clone.id, template.id);

        let original = store.get(template.id).await.unwrap();
        assert_eq!(original, template);
        assert_eq!(
            store.get_current("welcome", "en-us").await.unwrap().unwrap().id,
            template.id
        );
    }

    #[tokio::test]
    async fn test_clone_conflicts_with_existing_version() {
        let store = store();
        let template = store.create(welcome()).await.unwrap();
        store.create(welcome().version(1)).await.unwrap();

        assert!(matches!(
            store.clone_template(&template).await,
            Err(TemplateError::UniquenessConflict(_))
        ));
    }

    #[tokio::test]
    async fn test_delete() {
        let store = store();
        let template = store.create(welcome()).await.unwrap();
        store.delete(template.id).await.unwrap();
        assert!(matches!(
            store.get(template.id).await,
            Err(TemplateError::NotFound(_))
        ));
        assert!(matches!(
            store.delete(template.id).await,
            Err(TemplateError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_validity_partition() {
        let config = AppmailConfig {
            validate_on_save: false,
            ..Default::default()
        };
        let store = TemplateStore::in_memory(config);
        store.create(welcome()).await.unwrap();
        store
            .create(NewTemplate::named("broken").body_html("{% if %}"))
            .await
            .unwrap();

        let validity = store.validity(store.list().await.unwrap()).unwrap();
        assert_eq!(validity.valid.len(), 1);
        assert_eq!(validity.invalid.len(), 1);
        assert_eq!(validity.invalid[0].0.name, "broken");
        assert!(validity.invalid[0].1.get("body_html").is_some());
    }

    #[tokio::test]
    async fn test_clone_at_highest_version_is_rejected() {
        let store = store();
        let mut template = store.create(welcome()).await.unwrap();
        template.version = i32::MAX;

        assert!(matches!(
            store.clone_template(&template).await,
            Err(TemplateError::InvalidArgument(_))
        ));
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    struct FatalEngine;

    impl TemplateEngine for FatalEngine {
        fn render(
            &self,
            _name: &str,
            _source: &str,
            _context: &Context,
            _escape: Escape,
        ) -> Result<String, RenderError> {
            Err(RenderError::fatal("engine crashed"))
        }
    }

    #[tokio::test]
    async fn test_validity_returns_fatal_render_errors() {
        let config = AppmailConfig {
            validate_on_save: false,
            ..Default::default()
        };
        let store = TemplateStore::new(
            Arc::new(MemoryTemplateBackend::new()),
            Renderer::new(Arc::new(FatalEngine)),
            config,
        );
        store.create(welcome()).await.unwrap();

        match store.validity(store.list().await.unwrap()) {
            Err(TemplateError::Render(e)) => assert_eq!(e.message, "engine crashed"),
            other => panic!("expected fatal render error, got {:?}", other),
        }
    }
}
