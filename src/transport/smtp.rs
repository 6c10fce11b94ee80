//! SMTP transport backed by lettre

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::{self, HeaderName, HeaderValue};
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::client::{Tls, TlsParameters};
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::{SmtpConfig, TlsMode};
use crate::message::ComposedMessage;

use super::{MailTransport, TransportError};

/// Sends messages through an SMTP relay.
///
/// The plain text body and its HTML alternative go out as
/// `multipart/alternative`, wrapped in `multipart/mixed` when the message
/// carries attachments.
pub struct SmtpTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self, TransportError> {
        let host = config.host.as_str();

        let builder = match config.tls {
            TlsMode::None => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host),
            TlsMode::Starttls => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Required(Self::tls_parameters(host)?)),
            TlsMode::Tls => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
                .tls(Tls::Wrapper(Self::tls_parameters(host)?)),
        }
        .port(config.port)
        .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        let builder = match (&config.username, &config.password) {
            (Some(username), Some(password)) => {
                builder.credentials(Credentials::new(username.clone(), password.clone()))
            }
            (None, None) => builder,
            _ => {
                return Err(TransportError::Config(
                    "smtp.username and smtp.password must be set together".to_string(),
                ))
            }
        };

        Ok(Self {
            mailer: builder.build(),
            host: config.host.clone(),
        })
    }

    fn tls_parameters(host: &str) -> Result<TlsParameters, TransportError> {
        TlsParameters::builder(host.to_string())
            .build()
            .map_err(|e| TransportError::Config(format!("TLS configuration error: {}", e)))
    }

    fn mailbox(address: &str) -> Result<Mailbox, TransportError> {
        address
            .parse()
            .map_err(|_| TransportError::Address(address.to_string()))
    }

    /// Convert a composed message into a lettre `Message`
    pub fn build_message(message: &ComposedMessage) -> Result<Message, TransportError> {
        let mut builder = Message::builder()
            .from(Self::mailbox(&message.from_email)?)
            .subject(message.subject());

        for address in &message.to {
            builder = builder.to(Self::mailbox(address)?);
        }
        for address in &message.cc {
            builder = builder.cc(Self::mailbox(address)?);
        }
        for address in &message.bcc {
            builder = builder.bcc(Self::mailbox(address)?);
        }
        for address in &message.reply_to {
            builder = builder.reply_to(Self::mailbox(address)?);
        }
        for (name, value) in &message.headers {
            let name = HeaderName::new_from_ascii(name.clone())
                .map_err(|_| TransportError::Build(format!("Invalid header name: {}", name)))?;
            builder = builder.raw_header(HeaderValue::new(name, value.clone()));
        }

        let mut body = MultiPart::alternative().singlepart(
            SinglePart::builder()
                .header(header::ContentType::TEXT_PLAIN)
                .body(message.body().to_string()),
        );
        for alternative in message.alternatives() {
            let content_type = header::ContentType::parse(alternative.content_type.as_str())
                .map_err(|e| TransportError::Build(e.to_string()))?;
            body = body.singlepart(
                SinglePart::builder()
                    .header(content_type)
                    .body(alternative.content.clone()),
            );
        }

        let result = if message.attachments().is_empty() {
            builder.multipart(body)
        } else {
            let mut mixed = MultiPart::mixed().multipart(body);
            for attachment in message.attachments() {
                let content_type = header::ContentType::parse(&attachment.content_type)
                    .map_err(|e| TransportError::Build(e.to_string()))?;
                mixed = mixed.singlepart(
                    MailAttachment::new(attachment.filename.clone())
                        .body(attachment.data.clone(), content_type),
                );
            }
            builder.multipart(mixed)
        };

        result.map_err(|e| TransportError::Build(e.to_string()))
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, message: &ComposedMessage) -> Result<usize, TransportError> {
        let recipients = message.recipients().count();
        if recipients == 0 {
            return Ok(0);
        }

        let email = Self::build_message(message)?;
        self.mailer
            .send(email)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        tracing::debug!(
            host = %self.host,
            subject = %message.subject(),
            recipients = recipients,
            "Message sent over SMTP"
        );
        Ok(recipients)
    }

    fn transport_type(&self) -> &'static str {
        "smtp"
    }
}
