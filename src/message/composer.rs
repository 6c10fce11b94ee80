//! Template + context + envelope → composed multi-part message

use std::collections::BTreeMap;

use crate::config::AppmailConfig;
use crate::template::{
    ContentType, Context, EmailTemplate, Renderer, RequestContext,
};

use super::envelope::{Attachment, Envelope};
use super::MessageError;

/// An alternative representation of the message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    pub content: String,
    pub content_type: ContentType,
}

/// A fully rendered, ready to send message.
///
/// Subject, body and alternatives are always rendered from the template and
/// cannot be set by the caller.
#[derive(Debug, Clone)]
pub struct ComposedMessage {
    subject: String,
    body: String,
    alternatives: Vec<Alternative>,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub from_email: String,
    pub reply_to: Vec<String>,
    pub headers: BTreeMap<String, String>,
    attachments: Vec<Attachment>,
    template: EmailTemplate,
    context: Context,
}

impl ComposedMessage {
    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// Plain text body
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    /// HTML alternative, if present
    pub fn html(&self) -> Option<&str> {
        self.alternatives
            .iter()
            .find(|a| a.content_type == ContentType::Html)
            .map(|a| a.content.as_str())
    }

    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }

    /// Template the message was rendered from
    pub fn template(&self) -> &EmailTemplate {
        &self.template
    }

    /// Context the message was rendered with, before processors ran
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Every envelope recipient: to, cc and bcc
    pub fn recipients(&self) -> impl Iterator<Item = &str> {
        self.to
            .iter()
            .chain(self.cc.iter())
            .chain(self.bcc.iter())
            .map(String::as_str)
    }
}

/// Builds `ComposedMessage`s from templates
#[derive(Clone)]
pub struct MessageComposer {
    renderer: Renderer,
    add_extra_headers: bool,
    default_from_email: String,
}

impl MessageComposer {
    pub fn new(renderer: Renderer, config: &AppmailConfig) -> Self {
        Self {
            renderer,
            add_extra_headers: config.add_extra_headers,
            default_from_email: config.default_from_email.clone(),
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Compose a message from a template, context and envelope
    pub fn compose(
        &self,
        template: &EmailTemplate,
        context: Context,
        envelope: Envelope,
    ) -> Result<ComposedMessage, MessageError> {
        self.compose_with_request(template, context, envelope, None)
    }

    /// Compose a message, passing request details to context processors.
    ///
    /// Subject and plain text render unescaped; the HTML body is escaped.
    pub fn compose_with_request(
        &self,
        template: &EmailTemplate,
        context: Context,
        envelope: Envelope,
        request: Option<&RequestContext>,
    ) -> Result<ComposedMessage, MessageError> {
        if !envelope.attachments.is_empty() && !template.supports_attachments {
            return Err(MessageError::InvalidArgument(
                "Email template does not support attachments.".to_string(),
            ));
        }

        let reply_to = match envelope.reply_to {
            Some(reply_to) => reply_to.into_vec(),
            None => template.reply_to_list(),
        };
        let from_email = envelope
            .from_email
            .filter(|f| !f.trim().is_empty())
            .or_else(|| Some(template.from_email.clone()).filter(|f| !f.is_empty()))
            .unwrap_or_else(|| self.default_from_email.clone());

        let mut headers = envelope.headers;
        if self.add_extra_headers {
            headers.extend(template.extra_headers());
        }

        let subject = self.renderer.render_subject(template, &context, request)?;
        let body = self
            .renderer
            .render_body(template, &context, ContentType::Plain, request)?;
        let html = self
            .renderer
            .render_body(template, &context, ContentType::Html, request)?;

        tracing::debug!(
            template = %template.key(),
            to = envelope.to.as_slice().len(),
            cc = envelope.cc.as_slice().len(),
            bcc = envelope.bcc.as_slice().len(),
            attachments = envelope.attachments.len(),
            "Message composed"
        );

        Ok(ComposedMessage {
            subject,
            body,
            alternatives: vec![Alternative {
                content: html,
                content_type: ContentType::Html,
            }],
            to: envelope.to.into_vec(),
            cc: envelope.cc.into_vec(),
            bcc: envelope.bcc.into_vec(),
            from_email,
            reply_to,
            headers,
            attachments: envelope.attachments,
            template: template.clone(),
            context,
        })
    }
}
