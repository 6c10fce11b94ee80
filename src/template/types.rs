//! Template types and error definitions

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppmailConfig;

/// Header added to composed messages identifying the source template
pub const TEMPLATE_HEADER: &str = "X-Appmail-Template";

/// Template-specific error type
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Template already exists: {0}")]
    UniquenessConflict(String),

    #[error("Template failed validation: {0}")]
    Validation(ValidationErrors),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("Template storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for TemplateError {
    fn from(err: sqlx::Error) -> Self {
        TemplateError::Storage(err.to_string())
    }
}

/// Result type for template operations
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Class of a render failure.
///
/// `NotFound` and `Syntax` are recoverable during validation, anything else
/// is `Fatal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderErrorKind {
    NotFound,
    Syntax,
    Fatal,
}

impl RenderErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RenderErrorKind::NotFound => "not_found",
            RenderErrorKind::Syntax => "syntax",
            RenderErrorKind::Fatal => "fatal",
        }
    }
}

/// Error raised by a template engine while rendering a source string
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct RenderError {
    pub kind: RenderErrorKind,
    pub message: String,
}

impl RenderError {
    pub fn new(kind: RenderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::NotFound, message)
    }

    pub fn syntax(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::Syntax, message)
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(RenderErrorKind::Fatal, message)
    }

    pub fn is_recoverable(&self) -> bool {
        self.kind != RenderErrorKind::Fatal
    }
}

/// Per-field validation messages collected by `Renderer::clean`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, String>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields.insert(field.into(), message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.fields {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{}: {}", field, message)?;
            first = false;
        }
        Ok(())
    }
}

/// Body variant of a template
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentType {
    #[serde(rename = "text/plain")]
    Plain,
    #[serde(rename = "text/html")]
    Html,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Plain => "text/plain",
            ContentType::Html => "text/html",
        }
    }

    /// Name of the template field holding this body
    pub fn field_name(&self) -> &'static str {
        match self {
            ContentType::Plain => "body_text",
            ContentType::Html => "body_html",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text/plain" => Ok(ContentType::Plain),
            "text/html" => Ok(ContentType::Html),
            _ => Err(TemplateError::InvalidArgument(
                "Invalid content type.".to_string(),
            )),
        }
    }
}

/// A versioned, language scoped email template.
///
/// Each record has a unique `name:language.version` combination, so
/// localisation is handled by keeping several records with the same name:
///
/// ```text
/// order-confirmation:en.0
/// order-confirmation:de.0
/// order-confirmation:fr.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailTemplate {
    /// Storage assigned identifier
    pub id: i64,

    /// Template name, unique for a given language/version
    pub name: String,

    /// Optional description used to tell variants apart
    #[serde(default)]
    pub description: String,

    /// Free text language tag, e.g. "en-us", "de" or "London"
    pub language: String,

    /// Version (or A/B variant) number
    pub version: i32,

    /// Subject line template
    pub subject: String,

    /// Plain text body template
    pub body_text: String,

    /// HTML body template
    pub body_html: String,

    /// Default sender
    pub from_email: String,

    /// Comma separated default reply-to addresses
    pub reply_to: String,

    /// Inactive templates are never returned as "current"
    pub is_active: bool,

    /// Whether messages composed from this template may carry attachments
    pub supports_attachments: bool,

    /// Dummy context used for previews, derived on first save
    #[serde(default)]
    pub test_context: serde_json::Map<String, serde_json::Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl EmailTemplate {
    /// Reply-to field split into a list of trimmed addresses
    pub fn reply_to_list(&self) -> Vec<String> {
        split_addresses(&self.reply_to)
    }

    /// Headers identifying this template on outgoing messages
    pub fn extra_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        headers.insert(
            TEMPLATE_HEADER.to_string(),
            format!(
                "name={}; language={}; version={}",
                self.name, self.language, self.version
            ),
        );
        headers
    }

    pub fn has_text(&self) -> bool {
        !self.body_text.is_empty()
    }

    pub fn has_html(&self) -> bool {
        !self.body_html.is_empty()
    }

    /// Concatenated template sources, scanned for variables
    pub fn content(&self) -> String {
        format!("{}{}{}", self.subject, self.body_text, self.body_html)
    }

    /// Display key in the `name:language.version` form
    pub fn key(&self) -> String {
        format!("{}:{}.{}", self.name, self.language, self.version)
    }

    /// Validate field lengths
    pub fn validate_fields(&self) -> TemplateResult<()> {
        if self.name.is_empty() || self.name.chars().count() > 100 {
            return Err(TemplateError::InvalidArgument(
                "Name must be 1-100 characters".to_string(),
            ));
        }

        if self.language.chars().count() > 20 {
            return Err(TemplateError::InvalidArgument(
                "Language must be at most 20 characters".to_string(),
            ));
        }

        if self.subject.chars().count() > 100 {
            return Err(TemplateError::InvalidArgument(
                "Subject must be at most 100 characters".to_string(),
            ));
        }

        if self.description.chars().count() > 100 {
            return Err(TemplateError::InvalidArgument(
                "Description must be at most 100 characters".to_string(),
            ));
        }

        Ok(())
    }
}

/// Split a comma separated address string, dropping empty entries
pub(crate) fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Request to create a new template
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewTemplate {
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Defaults to the configured language
    pub language: Option<String>,

    #[serde(default)]
    pub version: i32,

    #[serde(default)]
    pub subject: String,

    #[serde(default)]
    pub body_text: String,

    #[serde(default)]
    pub body_html: String,

    /// Defaults to the configured sender
    pub from_email: Option<String>,

    /// Defaults to the configured sender
    pub reply_to: Option<String>,

    #[serde(default = "default_active")]
    pub is_active: bool,

    #[serde(default)]
    pub supports_attachments: bool,

    /// Explicit preview context; derived from the content when absent
    pub test_context: Option<serde_json::Map<String, serde_json::Value>>,
}

fn default_active() -> bool {
    true
}

impl NewTemplate {
    /// Start a request for the given name with every other field defaulted
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_active: true,
            ..Default::default()
        }
    }

    pub fn language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body_text(mut self, body_text: impl Into<String>) -> Self {
        self.body_text = body_text.into();
        self
    }

    pub fn body_html(mut self, body_html: impl Into<String>) -> Self {
        self.body_html = body_html.into();
        self
    }

    pub fn from_email(mut self, from_email: impl Into<String>) -> Self {
        self.from_email = Some(from_email.into());
        self
    }

    pub fn reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = is_active;
        self
    }

    pub fn supports_attachments(mut self, supports_attachments: bool) -> Self {
        self.supports_attachments = supports_attachments;
        self
    }

    /// Resolve configured defaults into an unsaved template (id 0)
    pub fn into_template(self, config: &AppmailConfig) -> EmailTemplate {
        let now = Utc::now();
        EmailTemplate {
            id: 0,
            name: self.name,
            description: self.description,
            language: self
                .language
                .unwrap_or_else(|| config.default_language.clone()),
            version: self.version,
            subject: self.subject,
            body_text: self.body_text,
            body_html: self.body_html,
            from_email: self
                .from_email
                .unwrap_or_else(|| config.default_from_email.clone()),
            reply_to: self
                .reply_to
                .unwrap_or_else(|| config.default_from_email.clone()),
            is_active: self.is_active,
            supports_attachments: self.supports_attachments,
            test_context: self.test_context.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        }
    }
}
