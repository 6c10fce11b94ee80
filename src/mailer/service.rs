use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;

use crate::config::AppmailConfig;
use crate::logged::{LogBackend, LoggedMessage};
use crate::message::{ComposedMessage, Envelope, MessageComposer};
use crate::metrics::{EMAILS_SENT_TOTAL, MESSAGES_LOGGED_TOTAL, SEND_FAILURES_TOTAL};
use crate::template::{Context, EmailTemplate, TemplateError, TemplateStore};
use crate::transport::MailTransport;
use crate::users::UserDirectory;

use super::types::{MailerError, MailerResult, SendOptions, TestSend, TestSendOutcome};

/// Counters for a single mailer
#[derive(Debug, Default)]
pub struct MailerStats {
    pub sent: AtomicU64,
    pub failed: AtomicU64,
    pub logged: AtomicU64,
}

impl MailerStats {
    pub fn snapshot(&self) -> MailerStatsSnapshot {
        MailerStatsSnapshot {
            sent: self.sent.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            logged: self.logged.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of mailer statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MailerStatsSnapshot {
    pub sent: u64,
    pub failed: u64,
    pub logged: u64,
}

/// Sends composed messages and writes one `LoggedMessage` per recipient.
///
/// The transport is called once per send and never retried. Logging happens
/// after the transport accepted the message, as a single atomic batch.
pub struct Mailer {
    templates: Arc<TemplateStore>,
    composer: MessageComposer,
    transport: Arc<dyn MailTransport>,
    logs: Arc<dyn LogBackend>,
    users: Arc<dyn UserDirectory>,
    config: AppmailConfig,
    stats: MailerStats,
}

impl Mailer {
    /// Create a mailer composing with the template store's renderer and config
    pub fn new(
        templates: Arc<TemplateStore>,
        transport: Arc<dyn MailTransport>,
        logs: Arc<dyn LogBackend>,
        users: Arc<dyn UserDirectory>,
    ) -> Self {
        let config = templates.config().clone();
        let composer = MessageComposer::new(templates.renderer().clone(), &config);
        Self {
            templates,
            composer,
            transport,
            logs,
            users,
            config,
            stats: MailerStats::default(),
        }
    }

    pub fn templates(&self) -> &Arc<TemplateStore> {
        &self.templates
    }

    pub fn composer(&self) -> &MessageComposer {
        &self.composer
    }

    pub fn logs(&self) -> &Arc<dyn LogBackend> {
        &self.logs
    }

    pub fn stats(&self) -> MailerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Compose a message from a template
    pub fn compose(
        &self,
        template: &EmailTemplate,
        context: Context,
        envelope: Envelope,
    ) -> MailerResult<ComposedMessage> {
        Ok(self.composer.compose(template, context, envelope)?)
    }

    /// Send a message.
    ///
    /// Returns the number of recipients the transport accepted. With
    /// `fail_silently` a transport failure is logged and reported as zero.
    #[tracing::instrument(
        name = "mailer.send",
        skip(self, message),
        fields(template = %message.template().key(), to = message.to.len())
    )]
    pub async fn send(&self, message: &ComposedMessage, options: SendOptions) -> MailerResult<usize> {
        let sent = match self.transport.send(message).await {
            Ok(sent) => sent,
            Err(e) => {
                SEND_FAILURES_TOTAL.inc();
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                if options.fail_silently {
                    tracing::warn!(error = %e, "Send failed silently");
                    return Ok(0);
                }
                tracing::error!(error = %e, "Send failed");
                return Err(MailerError::TransportFailure(e));
            }
        };

        if sent == 0 {
            tracing::debug!("No recipients, nothing sent");
            return Ok(0);
        }

        EMAILS_SENT_TOTAL.inc();
        self.stats.sent.fetch_add(1, Ordering::Relaxed);

        if options.log_sent_emails.unwrap_or(self.config.log_sent_emails) {
            self.log(message).await?;
        }

        tracing::info!(
            recipients = sent,
            transport = self.transport.transport_type(),
            "Message sent"
        );
        Ok(sent)
    }

    /// Compose from the current version of a named template and send it
    pub async fn send_template(
        &self,
        name: &str,
        language: &str,
        context: Context,
        envelope: Envelope,
        options: SendOptions,
    ) -> MailerResult<usize> {
        let template = self
            .templates
            .get_current(name, language)
            .await?
            .ok_or_else(|| TemplateError::NotFound(format!("{}:{}", name, language)))?;
        let message = self.compose(&template, context, envelope)?;
        self.send(&message, options).await
    }

    /// Rebuild the message a log record was written for.
    ///
    /// The message is re-rendered from the stored template and context and
    /// addressed to the record's single recipient.
    pub async fn rehydrate(&self, logged: &LoggedMessage) -> MailerResult<ComposedMessage> {
        let template_id = logged
            .template_id
            .ok_or(MailerError::MissingTemplate(logged.id))?;
        let template = match self.templates.get(template_id).await {
            Ok(template) => template,
            Err(TemplateError::NotFound(_)) => return Err(MailerError::MissingTemplate(logged.id)),
            Err(e) => return Err(e.into()),
        };

        self.compose(
            &template,
            logged.context.clone(),
            Envelope::to([logged.to.clone()]),
        )
    }

    /// Rehydrate a log record and send it again, writing a new record
    #[tracing::instrument(name = "mailer.resend", skip(self, logged), fields(id = %logged.id))]
    pub async fn resend(&self, logged: &LoggedMessage, options: SendOptions) -> MailerResult<usize> {
        let message = self.rehydrate(logged).await?;
        self.send(&message, options).await
    }

    /// Send one test message per template.
    ///
    /// Every template is attempted; failures are reported in its outcome.
    pub async fn send_test(&self, templates: &[EmailTemplate], test: &TestSend) -> Vec<TestSendOutcome> {
        let mut outcomes = Vec::with_capacity(templates.len());

        for template in templates {
            let envelope = Envelope {
                to: test.to.clone(),
                cc: test.cc.clone(),
                bcc: test.bcc.clone(),
                from_email: test.from_email.clone(),
                reply_to: test.reply_to.clone(),
                ..Default::default()
            };

            let result = match self.compose(template, test.context.clone(), envelope) {
                Ok(message) => self
                    .send(&message, SendOptions::default())
                    .await
                    .map(|_| message),
                Err(e) => Err(e),
            };

            outcomes.push(match result {
                Ok(message) => TestSendOutcome::sent(template.id, &template.name, &message.to),
                Err(e) => {
                    tracing::error!(template = %template.key(), error = %e, "Error sending test email");
                    TestSendOutcome::failed(template.id, &template.name, &e)
                }
            });
        }

        outcomes
    }

    /// Delete a template, keeping its log records with the template cleared
    pub async fn delete_template(&self, id: i64) -> MailerResult<u64> {
        self.templates.delete(id).await?;
        let detached = self.logs.detach_template(id).await?;
        tracing::info!(id = id, detached = detached, "Template detached from logged messages");
        Ok(detached)
    }

    async fn log(&self, message: &ComposedMessage) -> MailerResult<()> {
        let mut records = Vec::with_capacity(message.to.len());
        for to in &message.to {
            let user_id = self.users.find_by_email(to).await;
            records.push(LoggedMessage::from_message(message, to.clone(), user_id));
        }

        let count = records.len() as u64;
        self.logs.insert_batch(records).await?;
        MESSAGES_LOGGED_TOTAL.inc_by(count);
        self.stats.logged.fetch_add(count, Ordering::Relaxed);
        tracing::debug!(count = count, "Sent message logged");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logged::{LogBackendError, LogResult, MemoryLogBackend};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;
    use crate::message::Attachment;
    use crate::template::NewTemplate;
    use crate::transport::{MemoryTransport, TransportError};
    use crate::users::MemoryUserDirectory;
    use async_trait::async_trait;
    use serde_json::json;

    struct FailingTransport;

    #[async_trait]
    impl MailTransport for FailingTransport {
        async fn send(&self, _message: &ComposedMessage) -> Result<usize, TransportError> {
            Err(TransportError::Smtp("connection refused".to_string()))
        }

        fn transport_type(&self) -> &'static str {
            "failing"
        }
    }

    /// Log backend whose batch inserts always fail
    struct RejectingLogBackend {
        inner: MemoryLogBackend,
    }

    #[async_trait]
    impl LogBackend for RejectingLogBackend {
        async fn insert_batch(&self, _messages: Vec<LoggedMessage>) -> LogResult<()> {
            Err(LogBackendError::Unavailable("disk full".to_string()))
        }

        async fn get(&self, id: Uuid) -> LogResult<Option<LoggedMessage>> {
            self.inner.get(id).await
        }

        async fn list(&self) -> LogResult<Vec<LoggedMessage>> {
            self.inner.list().await
        }

        async fn for_recipient(&self, to: &str) -> LogResult<Vec<LoggedMessage>> {
            self.inner.for_recipient(to).await
        }

        async fn for_template(&self, template_id: i64) -> LogResult<Vec<LoggedMessage>> {
            self.inner.for_template(template_id).await
        }

        async fn count_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
            self.inner.count_before(cutoff).await
        }

        async fn delete_before(&self, cutoff: DateTime<Utc>) -> LogResult<u64> {
            self.inner.delete_before(cutoff).await
        }

        async fn detach_template(&self, template_id: i64) -> LogResult<u64> {
            self.inner.detach_template(template_id).await
        }

        fn backend_type(&self) -> &'static str {
            "rejecting"
        }
    }

    struct Fixture {
        mailer: Mailer,
        transport: Arc<MemoryTransport>,
        logs: Arc<MemoryLogBackend>,
        users: Arc<MemoryUserDirectory>,
    }

    fn fixture_with(config: AppmailConfig) -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        let logs = Arc::new(MemoryLogBackend::new());
        let users = Arc::new(MemoryUserDirectory::new());
        let mailer = Mailer::new(
            Arc::new(TemplateStore::in_memory(config)),
            transport.clone(),
            logs.clone(),
            users.clone(),
        );
        Fixture {
            mailer,
            transport,
            logs,
            users,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(AppmailConfig::default())
    }

    async fn welcome(mailer: &Mailer) -> EmailTemplate {
        mailer
            .templates()
            .create(
                NewTemplate::named("welcome")
                    .subject("Welcome message")
                    .body_text("Hello {{ first_name }}")
                    .body_html("<h1>Hello {{ first_name }}</h1>"),
            )
            .await
            .unwrap()
    }

    fn context() -> Context {
        json!({"first_name": "fråd"}).as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_log_failure_after_send_is_reported() {
        let transport = Arc::new(MemoryTransport::new());
        let logs = Arc::new(RejectingLogBackend {
            inner: MemoryLogBackend::new(),
        });
        let mailer = Mailer::new(
            Arc::new(TemplateStore::in_memory(AppmailConfig::default())),
            transport.clone(),
            logs.clone(),
            Arc::new(MemoryUserDirectory::new()),
        );
        let template = welcome(&mailer).await;
        let message = mailer
            .compose(
                &template,
                context(),
                Envelope::to(["fred@example.com", "ginger@example.com"]),
            )
            .unwrap();

        let result = mailer.send(&message, SendOptions::default()).await;

        assert!(matches!(
            result,
            Err(MailerError::Log(LogBackendError::Unavailable(_)))
        ));
        assert_eq!(transport.len().await, 1);
        assert!(logs.list().await.unwrap().is_empty());
        assert_eq!(mailer.stats().sent, 1);
    }

    #[tokio::test]
    async fn test_send_logs_each_recipient() {
        let f = fixture();
        f.users.insert(1, "fred@example.com");
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(
                &template,
                context(),
                Envelope::to(["fred@example.com", "ginger@example.com"]),
            )
            .unwrap();

        let sent = f.mailer.send(&message, SendOptions::default()).await.unwrap();
        assert_eq!(sent, 2);
        assert_eq!(f.transport.len().await, 1);

        let fred = f.logs.for_recipient("fred@example.com").await.unwrap();
        assert_eq!(fred.len(), 1);
        assert_eq!(fred[0].user_id, Some(1));
        assert_eq!(fred[0].template_id, Some(template.id));
        assert_eq!(fred[0].subject, "Welcome message");
        assert_eq!(fred[0].body, "Hello fråd");
        assert_eq!(fred[0].html, "<h1>Hello fråd</h1>");
        assert_eq!(fred[0].context, context());

        let ginger = f.logs.for_recipient("ginger@example.com").await.unwrap();
        assert_eq!(ginger[0].user_id, None);
        assert_eq!(f.mailer.stats().logged, 2);
    }

    #[tokio::test]
    async fn test_send_without_logging() {
        let f = fixture();
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(&template, context(), Envelope::to(["fred@example.com"]))
            .unwrap();

        f.mailer
            .send(&message, SendOptions::default().log_sent_emails(false))
            .await
            .unwrap();
        assert_eq!(f.transport.len().await, 1);
        assert!(f.logs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_logging_disabled_by_config() {
        let f = fixture_with(AppmailConfig {
            log_sent_emails: false,
            ..Default::default()
        });
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(&template, context(), Envelope::to(["fred@example.com"]))
            .unwrap();

        f.mailer.send(&message, SendOptions::default()).await.unwrap();
        assert!(f.logs.list().await.unwrap().is_empty());

        f.mailer
            .send(&message, SendOptions::default().log_sent_emails(true))
            .await
            .unwrap();
        assert_eq!(f.logs.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_send_without_recipients_logs_nothing() {
        let f = fixture();
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(&template, context(), Envelope::new())
            .unwrap();

        assert_eq!(f.mailer.send(&message, SendOptions::default()).await.unwrap(), 0);
        assert!(f.logs.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transport_failure() {
        let store = Arc::new(TemplateStore::in_memory(AppmailConfig::default()));
        let logs = Arc::new(MemoryLogBackend::new());
        let mailer = Mailer::new(
            store,
            Arc::new(FailingTransport),
            logs.clone(),
            Arc::new(MemoryUserDirectory::new()),
        );
        let template = welcome(&mailer).await;
        let message = mailer
            .compose(&template, context(), Envelope::to(["fred@example.com"]))
            .unwrap();

        assert!(matches!(
            mailer.send(&message, SendOptions::default()).await,
            Err(MailerError::TransportFailure(_))
        ));
        assert_eq!(
            mailer
                .send(&message, SendOptions::default().fail_silently(true))
                .await
                .unwrap(),
            0
        );
        assert!(logs.list().await.unwrap().is_empty());
        assert_eq!(mailer.stats().failed, 2);
    }

    #[tokio::test]
    async fn test_send_template_uses_current_version() {
        let f = fixture();
        welcome(&f.mailer).await;
        f.mailer
            .send_template(
                "welcome",
                "en-us",
                context(),
                Envelope::to(["fred@example.com"]),
                SendOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(f.transport.outbox().await[0].subject(), "Welcome message");

        assert!(matches!(
            f.mailer
                .send_template("missing", "en-us", context(), Envelope::new(), SendOptions::default())
                .await,
            Err(MailerError::Template(TemplateError::NotFound(_)))
        ));
    }

    #[tokio::test]
    async fn test_rehydrate_and_resend() {
        let f = fixture();
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(&template, context(), Envelope::to(["fred@example.com"]))
            .unwrap();
        f.mailer.send(&message, SendOptions::default()).await.unwrap();

        let logged = f.logs.list().await.unwrap().remove(0);
        let rehydrated = f.mailer.rehydrate(&logged).await.unwrap();
        assert_eq!(rehydrated.template(), &template);
        assert_eq!(rehydrated.context(), &context());
        assert_eq!(rehydrated.to, vec!["fred@example.com"]);

        f.mailer.resend(&logged, SendOptions::default()).await.unwrap();
        assert_eq!(f.transport.len().await, 2);
        assert_eq!(f.logs.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_rehydrate_after_template_deleted() {
        let f = fixture();
        let template = welcome(&f.mailer).await;
        let message = f
            .mailer
            .compose(&template, context(), Envelope::to(["fred@example.com"]))
            .unwrap();
        f.mailer.send(&message, SendOptions::default()).await.unwrap();

        assert_eq!(f.mailer.delete_template(template.id).await.unwrap(), 1);
        let logged = f.logs.list().await.unwrap().remove(0);
        assert_eq!(logged.template_id, None);
        assert_eq!(logged.template_name, "welcome");
        assert!(matches!(
            f.mailer.resend(&logged, SendOptions::default()).await,
            Err(MailerError::MissingTemplate(id)) if id == logged.id
        ));
    }

    #[tokio::test]
    async fn test_send_test_reports_each_template() {
        let f = fixture();
        let welcome = welcome(&f.mailer).await;
        let receipt = f
            .mailer
            .templates()
            .create(NewTemplate::named("receipt").subject("Receipt"))
            .await
            .unwrap();

        let test = TestSend {
            context: context(),
            to: vec!["fred@example.com".to_string(), "ginger@example.com".to_string()].into(),
            ..Default::default()
        };
        let outcomes = f.mailer.send_test(&[welcome, receipt], &test).await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.success));
        assert_eq!(
            outcomes[0].message,
            "'welcome' email sent to 'fred@example.com, ginger@example.com'"
        );
        assert_eq!(f.transport.len().await, 2);
    }

    #[tokio::test]
    async fn test_send_test_continues_after_failure() {
        let config = AppmailConfig {
            validate_on_save: false,
            ..Default::default()
        };
        let f = fixture_with(config);
        let broken = f
            .mailer
            .templates()
            .create(NewTemplate::named("broken").body_html("{% if %}"))
            .await
            .unwrap();
        let welcome = welcome(&f.mailer).await;

        let test = TestSend {
            to: "fred@example.com".into(),
            ..Default::default()
        };
        let outcomes = f.mailer.send_test(&[broken, welcome], &test).await;

        assert!(!outcomes[0].success);
        assert!(outcomes[0]
            .message
            .starts_with("Error sending test email 'broken': "));
        assert!(outcomes[1].success);
        assert_eq!(f.transport.len().await, 1);
    }

    #[tokio::test]
    async fn test_attachment_rejected_before_send() {
        let f = fixture();
        let template = welcome(&f.mailer).await;
        let envelope = Envelope::to(["fred@example.com"])
            .attachment(Attachment::new("a.txt", "text/plain", b"a".to_vec()));

        assert!(matches!(
            f.mailer.compose(&template, context(), envelope),
            Err(MailerError::Message(_))
        ));
        assert!(f.transport.is_empty().await);
    }
}
