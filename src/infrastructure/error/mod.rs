use thiserror::Error;

use crate::logged::LogBackendError;
use crate::mailer::MailerError;
use crate::postgres::PostgresPoolError;
use crate::template::TemplateError;
use crate::transport::TransportError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] PostgresPoolError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Mailer(#[from] MailerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<TransportError> for AppError {
    fn from(err: TransportError) -> Self {
        AppError::Mailer(MailerError::TransportFailure(err))
    }
}

impl From<LogBackendError> for AppError {
    fn from(err: LogBackendError) -> Self {
        AppError::Mailer(MailerError::Log(err))
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
