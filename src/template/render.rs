//! Rendering and validation of template subject and bodies.
//!
//! Rendering goes through the [`TemplateEngine`] seam so the engine can be
//! swapped out. The caller's context is the base, and every registered
//! [`ContextProcessor`] patches its keys on top in list order.

use std::sync::Arc;

use minijinja::{escape_formatter, AutoEscape, Environment, ErrorKind, Output, State, UndefinedBehavior};
use serde_json::{Map, Value};

use crate::config::AppmailConfig;
use crate::metrics::RENDER_ERRORS_TOTAL;

use super::types::{
    ContentType, EmailTemplate, RenderError, RenderErrorKind, TemplateError, TemplateResult,
    ValidationErrors,
};

/// Variables available to a template while rendering
pub type Context = Map<String, Value>;

/// Output escaping applied by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    None,
    Html,
}

/// Template engine collaborator.
///
/// Implementations must report missing template sources as
/// `RenderErrorKind::NotFound` and malformed sources as
/// `RenderErrorKind::Syntax`. Anything else is `Fatal`.
pub trait TemplateEngine: Send + Sync {
    fn render(
        &self,
        name: &str,
        source: &str,
        context: &Context,
        escape: Escape,
    ) -> Result<String, RenderError>;
}

/// Template engine backed by minijinja.
///
/// Undefined variables and lookups on them render as empty strings. HTML
/// escaping is driven by the template name, which is derived from the
/// requested `Escape`.
pub struct MiniJinjaEngine {
    env: Environment<'static>,
}

impl Default for MiniJinjaEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MiniJinjaEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.set_keep_trailing_newline(true);
        env.set_formatter(html_formatter);
        env.set_auto_escape_callback(|name| {
            if name.ends_with(".html") {
                AutoEscape::Html
            } else {
                AutoEscape::None
            }
        });
        Self { env }
    }

    fn classify(err: &minijinja::Error) -> RenderErrorKind {
        match err.kind() {
            ErrorKind::TemplateNotFound => RenderErrorKind::NotFound,
            ErrorKind::SyntaxError
            | ErrorKind::UnknownFilter
            | ErrorKind::UnknownTest
            | ErrorKind::UnknownBlock => RenderErrorKind::Syntax,
            _ => RenderErrorKind::Fatal,
        }
    }
}

/// Escape `&`, `<`, `>`, `"` and `'`, leaving every other character as is
fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#x27;"),
            c => escaped.push(c),
        }
    }
    escaped
}

fn html_formatter(
    out: &mut Output,
    state: &State,
    value: &minijinja::Value,
) -> Result<(), minijinja::Error> {
    let escape = matches!(state.auto_escape(), AutoEscape::Html)
        && !value.is_safe()
        && !value.is_undefined()
        && !value.is_none();
    if escape {
        out.write_str(&escape_html(&value.to_string()))?;
        Ok(())
    } else {
        escape_formatter(out, state, value)
    }
}

impl TemplateEngine for MiniJinjaEngine {
    fn render(
        &self,
        name: &str,
        source: &str,
        context: &Context,
        escape: Escape,
    ) -> Result<String, RenderError> {
        let name = match escape {
            Escape::Html => format!("{}.html", name),
            Escape::None => format!("{}.txt", name),
        };

        self.env
            .render_named_str(&name, source, context)
            .map_err(|e| RenderError::new(Self::classify(&e), e.to_string()))
    }
}

/// Request information handed to context processors
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Email of the user making the request, if known
    pub user_email: Option<String>,

    /// Host the request was made against
    pub host: Option<String>,

    /// Free-form request attributes
    pub attributes: Context,
}

/// Adds values to the render context
pub trait ContextProcessor: Send + Sync {
    fn process(&self, request: Option<&RequestContext>) -> Context;
}

impl<F> ContextProcessor for F
where
    F: Fn(Option<&RequestContext>) -> Context + Send + Sync,
{
    fn process(&self, request: Option<&RequestContext>) -> Context {
        self(request)
    }
}

/// Processor that injects a fixed set of values
pub struct StaticContextProcessor {
    values: Context,
}

impl StaticContextProcessor {
    pub fn new(values: Context) -> Self {
        Self { values }
    }
}

impl ContextProcessor for StaticContextProcessor {
    fn process(&self, _request: Option<&RequestContext>) -> Context {
        self.values.clone()
    }
}

/// Renders templates against a context patched by the registered processors
#[derive(Clone)]
pub struct Renderer {
    engine: Arc<dyn TemplateEngine>,
    processors: Vec<Arc<dyn ContextProcessor>>,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(Arc::new(MiniJinjaEngine::new()))
    }
}

impl Renderer {
    /// Create a renderer without context processors
    pub fn new(engine: Arc<dyn TemplateEngine>) -> Self {
        Self {
            engine,
            processors: Vec::new(),
        }
    }

    /// Create the default renderer, registering the configured static context
    pub fn from_config(config: &AppmailConfig) -> Self {
        let renderer = Self::default();
        if config.static_context.is_empty() {
            renderer
        } else {
            renderer.with_processor(Arc::new(StaticContextProcessor::new(
                config.static_context.clone(),
            )))
        }
    }

    /// Append a processor; later processors override earlier ones
    pub fn with_processor(mut self, processor: Arc<dyn ContextProcessor>) -> Self {
        self.processors.push(processor);
        self
    }

    /// Caller context patched with every processor's output
    pub fn patch_context(&self, context: &Context, request: Option<&RequestContext>) -> Context {
        let mut patched = context.clone();
        for processor in &self.processors {
            for (key, value) in processor.process(request) {
                patched.insert(key, value);
            }
        }
        patched
    }

    /// Render the subject line, unescaped
    pub fn render_subject(
        &self,
        template: &EmailTemplate,
        context: &Context,
        request: Option<&RequestContext>,
    ) -> Result<String, RenderError> {
        let context = self.patch_context(context, request);
        self.render_source("subject", &template.subject, &context, Escape::None)
    }

    /// Render the plain text (unescaped) or HTML (escaped) body
    pub fn render_body(
        &self,
        template: &EmailTemplate,
        context: &Context,
        content_type: ContentType,
        request: Option<&RequestContext>,
    ) -> Result<String, RenderError> {
        let context = self.patch_context(context, request);
        match content_type {
            ContentType::Plain => {
                self.render_source("body_text", &template.body_text, &context, Escape::None)
            }
            ContentType::Html => {
                self.render_source("body_html", &template.body_html, &context, Escape::Html)
            }
        }
    }

    /// Render the subject against the template's stored test context
    pub fn preview_subject(&self, template: &EmailTemplate) -> Result<String, RenderError> {
        self.render_subject(template, &template.test_context, None)
    }

    /// Render a body against the template's stored test context
    pub fn preview_body(
        &self,
        template: &EmailTemplate,
        content_type: ContentType,
    ) -> Result<String, RenderError> {
        self.render_body(template, &template.test_context, content_type, None)
    }

    /// Check that the subject and both bodies render with an empty context.
    ///
    /// Missing template sources and syntax errors become per-field messages,
    /// collected into a single `TemplateError::Validation`. Any other render
    /// failure is returned as `TemplateError::Render`. A clean result does
    /// not guarantee that rendering with a real context succeeds.
    pub fn clean(&self, template: &EmailTemplate) -> TemplateResult<()> {
        let empty = Context::new();
        let mut errors = ValidationErrors::new();

        for content_type in [ContentType::Plain, ContentType::Html] {
            let result = self.render_body(template, &empty, content_type, None);
            Self::collect(&mut errors, content_type.field_name(), result)?;
        }
        let result = self.render_subject(template, &empty, None);
        Self::collect(&mut errors, "subject", result)?;

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::debug!(
                template = %template.key(),
                errors = %errors,
                "Template failed validation"
            );
            Err(TemplateError::Validation(errors))
        }
    }

    fn collect(
        errors: &mut ValidationErrors,
        field: &str,
        result: Result<String, RenderError>,
    ) -> TemplateResult<()> {
        let e = match result {
            Ok(_) => return Ok(()),
            Err(e) if !e.is_recoverable() => return Err(TemplateError::Render(e)),
            Err(e) => e,
        };
        let message = if e.kind == RenderErrorKind::NotFound {
            format!("Template does not exist: {}", e.message)
        } else {
            e.message
        };
        errors.add(field, message);
        Ok(())
    }

    fn render_source(
        &self,
        name: &str,
        source: &str,
        context: &Context,
        escape: Escape,
    ) -> Result<String, RenderError> {
        self.engine
            .render(name, source, context, escape)
            .inspect_err(|e| {
                RENDER_ERRORS_TOTAL.with_label_values(&[e.kind.as_str()]).inc();
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::NewTemplate;
    use serde_json::json;

    fn template(subject: &str, body_text: &str, body_html: &str) -> EmailTemplate {
        NewTemplate::named("test")
            .subject(subject)
            .body_text(body_text)
            .body_html(body_html)
            .into_template(&AppmailConfig::default())
    }

    fn context(value: Value) -> Context {
        value.as_object().cloned().unwrap()
    }

    /// Engine returning a fixed error for one template name
    struct FailingEngine {
        field: &'static str,
        error: RenderError,
    }

    impl TemplateEngine for FailingEngine {
        fn render(
            &self,
            name: &str,
            source: &str,
            _context: &Context,
            _escape: Escape,
        ) -> Result<String, RenderError> {
            if name == self.field {
                Err(self.error.clone())
            } else {
                Ok(source.to_string())
            }
        }
    }

    fn failing(field: &'static str, error: RenderError) -> Renderer {
        Renderer::new(Arc::new(FailingEngine { field, error }))
    }

    #[test]
    fn test_render_subject() {
        let renderer = Renderer::default();
        let template = template("Hello {{ first_name }}", "", "");
        let subject = renderer
            .render_subject(&template, &context(json!({"first_name": "fråd"})), None)
            .unwrap();
        assert_eq!(subject, "Hello fråd");
    }

    #[test]
    fn test_render_body() {
        let renderer = Renderer::default();
        let template = template(
            "",
            "Hello {{ first_name }}",
            "<h1>Hello {{ first_name }}</h1>",
        );
        let ctx = context(json!({"first_name": "fråd"}));

        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Plain, None)
                .unwrap(),
            "Hello fråd"
        );
        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Html, None)
                .unwrap(),
            "<h1>Hello fråd</h1>"
        );
    }

    #[test]
    fn test_html_is_escaped_plain_is_not() {
        let renderer = Renderer::default();
        let template = template(
            "Welcome {{ first_name }}",
            "Hello {{ first_name }}",
            "<h1>Hello {{ first_name }}</h1>",
        );
        let ctx = context(json!({"first_name": "Test & Company"}));

        assert_eq!(
            renderer.render_subject(&template, &ctx, None).unwrap(),
            "Welcome Test & Company"
        );
        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Plain, None)
                .unwrap(),
            "Hello Test & Company"
        );
        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Html, None)
                .unwrap(),
            "<h1>Hello Test &amp; Company</h1>"
        );
    }

    #[test]
    fn test_html_escaping_leaves_slashes() {
        let renderer = Renderer::default();
        let template = template("", "", "<a href=\"{{ link }}\">{{ name }}</a>");
        let ctx = context(json!({
            "link": "https://example.com/a/b?x=1&y=2",
            "name": "O'Neil \"<b>\""
        }));

        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Html, None)
                .unwrap(),
            "<a href=\"https://example.com/a/b?x=1&amp;y=2\">O&#x27;Neil &quot;&lt;b&gt;&quot;</a>"
        );
    }

    #[test]
    fn test_html_escaping_respects_safe_filter() {
        let renderer = Renderer::default();
        let template = template("", "", "{{ snippet|safe }} {{ missing }}|{{ count }}");
        let ctx = context(json!({"snippet": "<br/>", "count": 3}));

        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Html, None)
                .unwrap(),
            "<br/> |3"
        );
    }

    #[test]
    fn test_trailing_newline_is_kept() {
        let renderer = Renderer::default();
        let template = template("", "Hello {{ name }}\n", "<p>{{ name }}</p>\n");
        let ctx = context(json!({"name": "Fred"}));

        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Plain, None)
                .unwrap(),
            "Hello Fred\n"
        );
        assert_eq!(
            renderer
                .render_body(&template, &ctx, ContentType::Html, None)
                .unwrap(),
            "<p>Fred</p>\n"
        );
    }

    #[test]
    fn test_missing_variables_render_empty() {
        let renderer = Renderer::default();
        let template = template("Hi {{ user.first_name }}!", "", "");
        assert_eq!(
            renderer.render_subject(&template, &Context::new(), None).unwrap(),
            "Hi !"
        );
    }

    #[test]
    fn test_context_processors_patch_in_order() {
        let first = |_: Option<&RequestContext>| context(json!({"site": "first", "a": 1}));
        let second = |_: Option<&RequestContext>| context(json!({"site": "second"}));
        let renderer = Renderer::default()
            .with_processor(Arc::new(first))
            .with_processor(Arc::new(second));

        let patched = renderer.patch_context(&context(json!({"site": "caller", "b": 2})), None);
        assert_eq!(
            Value::Object(patched),
            json!({"site": "second", "a": 1, "b": 2})
        );
    }

    #[test]
    fn test_context_processor_receives_request() {
        let processor = |request: Option<&RequestContext>| {
            let mut ctx = Context::new();
            if let Some(email) = request.and_then(|r| r.user_email.clone()) {
                ctx.insert("requested_by".to_string(), Value::String(email));
            }
            ctx
        };
        let renderer = Renderer::default().with_processor(Arc::new(processor));
        let template = template("By {{ requested_by }}", "", "");
        let request = RequestContext {
            user_email: Some("admin@example.com".to_string()),
            ..Default::default()
        };

        assert_eq!(
            renderer
                .render_subject(&template, &Context::new(), Some(&request))
                .unwrap(),
            "By admin@example.com"
        );
    }

    #[test]
    fn test_static_context_from_config() {
        let mut config = AppmailConfig::default();
        config
            .static_context
            .insert("site_name".to_string(), json!("Example"));
        let renderer = Renderer::from_config(&config);
        let template = template("Welcome to {{ site_name }}", "", "");

        assert_eq!(
            renderer.render_subject(&template, &Context::new(), None).unwrap(),
            "Welcome to Example"
        );
    }

    #[test]
    fn test_clean_valid_template() {
        let renderer = Renderer::default();
        let template = template("Hi {{ name }}", "Hello {{ name }}", "<p>{{ name }}</p>");
        assert!(renderer.clean(&template).is_ok());
    }

    #[test]
    fn test_clean_syntax_error_with_minijinja() {
        let renderer = Renderer::default();
        let template = template("Hi {{ name", "Hello {% if %}", "<p>ok</p>");

        match renderer.clean(&template) {
            Err(TemplateError::Validation(errors)) => {
                assert_eq!(errors.len(), 2);
                assert!(errors.get("subject").is_some());
                assert!(errors.get("body_text").is_some());
                assert!(errors.get("body_html").is_none());
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_missing_include_with_minijinja() {
        let renderer = Renderer::default();
        let template = template("ok", "ok", "{% include \"foo.html\" %}");

        match renderer.clean(&template) {
            Err(TemplateError::Validation(errors)) => {
                let message = errors.get("body_html").unwrap();
                assert!(message.starts_with("Template does not exist: "));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_not_found_is_field_scoped() {
        let renderer = failing("subject", RenderError::not_found("foo.html"));
        match renderer.clean(&template("", "", "")) {
            Err(TemplateError::Validation(errors)) => {
                assert_eq!(errors.get("subject"), Some("Template does not exist: foo.html"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_syntax_error_is_field_scoped() {
        let renderer = failing("body_html", RenderError::syntax("No can do"));
        match renderer.clean(&template("", "", "")) {
            Err(TemplateError::Validation(errors)) => {
                assert_eq!(errors.len(), 1);
                assert_eq!(errors.get("body_html"), Some("No can do"));
            }
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_clean_fatal_error_propagates() {
        let renderer = failing("body_text", RenderError::fatal("Something else"));
        match renderer.clean(&template("", "", "")) {
            Err(TemplateError::Render(e)) => {
                assert_eq!(e.kind, RenderErrorKind::Fatal);
                assert_eq!(e.message, "Something else");
            }
            other => panic!("expected fatal render error, got {:?}", other),
        }
    }

    #[test]
    fn test_preview_uses_test_context() {
        let renderer = Renderer::default();
        let mut template = template("Hi {{ name }}", "", "<b>{{ name }}</b>");
        template
            .test_context
            .insert("name".to_string(), json!("NAME"));

        assert_eq!(renderer.preview_subject(&template).unwrap(), "Hi NAME");
        assert_eq!(
            renderer.preview_body(&template, ContentType::Html).unwrap(),
            "<b>NAME</b>"
        );
    }
}
