//! Logged message record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::message::ComposedMessage;
use crate::template::Context;

/// Audit record of one sent message for one recipient.
///
/// The template reference is cleared when the template is deleted;
/// `template_name` keeps the name for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedMessage {
    pub id: Uuid,

    /// Single recipient address
    pub to: String,

    /// User the recipient address mapped to, if any
    pub user_id: Option<i64>,

    pub template_id: Option<i64>,

    #[serde(default)]
    pub template_name: String,

    pub subject: String,

    /// Plain text body as sent
    pub body: String,

    /// HTML body as sent
    pub html: String,

    /// Context the message was rendered with
    pub context: Context,

    pub timestamp: DateTime<Utc>,
}

impl LoggedMessage {
    /// Record of `message` as delivered to `to`
    pub fn from_message(message: &ComposedMessage, to: impl Into<String>, user_id: Option<i64>) -> Self {
        let template = message.template();
        Self {
            id: Uuid::new_v4(),
            to: to.into(),
            user_id,
            template_id: (template.id > 0).then_some(template.id),
            template_name: template.name.clone(),
            subject: message.subject().to_string(),
            body: message.body().to_string(),
            html: message.html().unwrap_or_default().to_string(),
            context: message.context().clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppmailConfig;
    use crate::message::{Envelope, MessageComposer};
    use crate::template::{NewTemplate, Renderer};
    use serde_json::json;

    #[test]
    fn test_from_message() {
        let config = AppmailConfig::default();
        let mut template = NewTemplate::named("welcome")
            .subject("Hi {{ name }}")
            .body_text("Hello {{ name }}")
            .body_html("<p>Hello {{ name }}</p>")
            .into_template(&config);
        template.id = 7;
        let context = json!({"name": "Fred"}).as_object().cloned().unwrap();
        let message = MessageComposer::new(Renderer::default(), &config)
            .compose(&template, context.clone(), Envelope::to(["fred@example.com"]))
            .unwrap();

        let logged = LoggedMessage::from_message(&message, "fred@example.com", Some(3));
        assert_eq!(logged.to, "fred@example.com");
        assert_eq!(logged.user_id, Some(3));
        assert_eq!(logged.template_id, Some(7));
        assert_eq!(logged.template_name, "welcome");
        assert_eq!(logged.subject, "Hi Fred");
        assert_eq!(logged.body, "Hello Fred");
        assert_eq!(logged.html, "<p>Hello Fred</p>");
        assert_eq!(logged.context, context);
    }
}
