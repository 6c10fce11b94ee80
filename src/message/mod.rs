//! Message composition.
//!
//! A [`ComposedMessage`] is a plain value: what a message contains. Sending
//! it (and logging the send) is the job of [`crate::mailer::Mailer`].

mod composer;
mod envelope;

pub use composer::{Alternative, ComposedMessage, MessageComposer};
pub use envelope::{AddressList, Attachment, Envelope};

use thiserror::Error;

use crate::template::RenderError;

/// Message composition error type
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("Failed to render message: {0}")]
    Render(#[from] RenderError),
}

/// Result type for message composition
pub type MessageResult<T> = Result<T, MessageError>;
