mod settings;

pub use settings::{
    AppmailConfig, DatabaseConfig, LoggingConfig, MailBackend, MailConfig, Settings, SmtpConfig,
    StorageBackend, StorageConfig, TlsMode,
};
