use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub appmail: AppmailConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub smtp: SmtpConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Feature flags and defaults for template handling and sending.
///
/// Passed explicitly into the template store, composer and mailer; nothing
/// reads these values from global state.
#[derive(Debug, Clone, Deserialize)]
pub struct AppmailConfig {
    /// Validate that a template renders before every save
    #[serde(default = "default_true")]
    pub validate_on_save: bool,
    /// Add the `X-Appmail-Template` header to outgoing messages
    #[serde(default = "default_true")]
    pub add_extra_headers: bool,
    /// Write a `LoggedMessage` per recipient after a successful send
    #[serde(default = "default_true")]
    pub log_sent_emails: bool,
    /// Days after which logged messages may be truncated
    #[serde(default = "default_log_retention_days")]
    pub log_retention_days: i64,
    /// Language used when a template does not specify one
    #[serde(default = "default_language")]
    pub default_language: String,
    /// Sender (and reply-to) used when a template does not specify one
    #[serde(default = "default_from_email")]
    pub default_from_email: String,
    /// Fixed values patched into every render context
    #[serde(default)]
    pub static_context: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_log_retention_days() -> i64 {
    180
}

fn default_language() -> String {
    "en-us".to_string()
}

fn default_from_email() -> String {
    "webmaster@localhost".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u32,
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_seconds: u32,
    /// Table queried when mapping recipients to users
    #[serde(default = "default_users_table")]
    pub users_table: String,
}

fn default_database_url() -> String {
    "postgres://localhost/appmail".to_string()
}

fn default_pool_size() -> u32 {
    5
}

fn default_connect_timeout() -> u32 {
    5
}

fn default_idle_timeout() -> u32 {
    600 // 10 minutes
}

fn default_users_table() -> String {
    "users".to_string()
}

/// Where composed messages are delivered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Smtp,
    /// Keep messages in an in-process outbox
    Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MailConfig {
    #[serde(default)]
    pub backend: MailBackend,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TlsMode {
    None,
    #[default]
    Starttls,
    Tls,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: TlsMode,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_smtp_timeout")]
    pub timeout_seconds: u64,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}

fn default_smtp_port() -> u16 {
    587
}

fn default_smtp_timeout() -> u64 {
    30
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit logs as JSON lines instead of human readable text
    #[serde(default)]
    pub json: bool,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            .set_default("appmail.validate_on_save", true)?
            .set_default("appmail.add_extra_headers", true)?
            .set_default("appmail.log_sent_emails", true)?
            .set_default("appmail.log_retention_days", 180)?
            .set_default("storage.backend", "memory")?
            .set_default("mail.backend", "smtp")?
            .set_default("smtp.host", "localhost")?
            .set_default("smtp.port", 587)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // APPMAIL__APPMAIL__LOG_SENT_EMAILS, APPMAIL__DATABASE__URL, APPMAIL__SMTP__HOST, etc.
            .add_source(
                Environment::with_prefix("APPMAIL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            appmail: AppmailConfig::default(),
            storage: StorageConfig::default(),
            database: DatabaseConfig::default(),
            mail: MailConfig::default(),
            smtp: SmtpConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AppmailConfig {
    fn default() -> Self {
        Self {
            validate_on_save: true,
            add_extra_headers: true,
            log_sent_emails: true,
            log_retention_days: default_log_retention_days(),
            default_language: default_language(),
            default_from_email: default_from_email(),
            static_context: serde_json::Map::new(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            pool_size: default_pool_size(),
            connect_timeout_seconds: default_connect_timeout(),
            idle_timeout_seconds: default_idle_timeout(),
            users_table: default_users_table(),
        }
    }
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: default_smtp_host(),
            port: default_smtp_port(),
            tls: TlsMode::default(),
            username: None,
            password: None,
            timeout_seconds: default_smtp_timeout(),
        }
    }
}
