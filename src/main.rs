use std::sync::Arc;

use anyhow::{bail, Context as _, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};

use appmail::config::{Settings, StorageBackend};
use appmail::logged::{create_log_backend, truncate_logs};
use appmail::mailer::{Mailer, TestSend};
use appmail::message::AddressList;
use appmail::postgres::PostgresPool;
use appmail::telemetry::init_tracing;
use appmail::template::{
    create_template_backend, merge_contexts, ContentType, Context, Renderer, TemplateStore,
};
use appmail::transport::create_mail_transport;
use appmail::users::create_user_directory;

#[derive(Parser)]
#[command(name = "appmail")]
#[command(version)]
#[command(about = "Manage email templates and logged messages", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Truncate all logged messages older than the retention period
    TruncateLogs {
        /// The number of days to retain logged messages
        #[arg(short, long)]
        retention: Option<i64>,
        /// Delete the records; without this only a count is reported
        #[arg(short, long)]
        commit: bool,
    },
    /// Check that every template renders
    CheckTemplates,
    /// Render the current (or a given) version of a template
    Render {
        /// Template name
        name: String,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        version: Option<i32>,
        /// `text/plain`, `text/html` or `subject`
        #[arg(long, default_value = "text/plain")]
        content_type: String,
        /// JSON context; defaults to the template's test context
        #[arg(long)]
        context: Option<String>,
    },
    /// Send test emails from one or more templates
    SendTest {
        /// Template ids
        #[arg(required = true, value_delimiter = ',')]
        templates: Vec<i64>,
        #[arg(long, required = true)]
        to: String,
        /// JSON context; defaults to the merged test contexts of the templates
        #[arg(long)]
        context: Option<String>,
        #[arg(long = "from")]
        from_email: Option<String>,
        #[arg(long)]
        reply_to: Option<String>,
        #[arg(long)]
        cc: Option<String>,
        #[arg(long)]
        bcc: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let settings = Settings::new()?;
    init_tracing(&settings.logging)?;
    tracing::info!("Configuration loaded");

    let postgres_pool = connect(&settings).await?;

    let templates = Arc::new(TemplateStore::new(
        create_template_backend(&settings.storage, postgres_pool.clone()),
        Renderer::from_config(&settings.appmail),
        settings.appmail.clone(),
    ));
    let logs = create_log_backend(&settings.storage, postgres_pool.clone());

    let result = match cli.command {
        Commands::TruncateLogs { retention, commit } => {
            let retention = retention.unwrap_or(settings.appmail.log_retention_days);
            let report = truncate_logs(logs.as_ref(), retention, commit, Utc::now().date_naive()).await?;
            println!("Truncating records before {}", report.cutoff.date_naive());
            println!("Deleting {} records", report.matched);
            if report.committed {
                println!("Deleted {} records.", report.deleted);
            } else {
                eprintln!("Aborting transaction as --commit is False.");
            }
            Ok(())
        }
        Commands::CheckTemplates => {
            // Fatal render errors abort the run instead of counting as invalid
            let validity = templates.validity(templates.list().await?)?;
            for template in &validity.valid {
                println!("ok       {}", template.key());
            }
            for (template, errors) in &validity.invalid {
                println!("invalid  {}: {}", template.key(), errors);
            }
            if !validity.invalid.is_empty() {
                bail!("{} template(s) failed validation", validity.invalid.len());
            }
            Ok(())
        }
        Commands::Render {
            name,
            language,
            version,
            content_type,
            context,
        } => {
            let language = language.unwrap_or_else(|| settings.appmail.default_language.clone());
            let template = match version {
                Some(version) => templates.get_version(&name, &language, version).await?,
                None => templates
                    .get_current(&name, &language)
                    .await?
                    .with_context(|| format!("No active template {}:{}", name, language))?,
            };
            let context = match context {
                Some(json) => parse_context(&json)?,
                None => template.test_context.clone(),
            };

            let renderer = templates.renderer();
            let output = if content_type == "subject" {
                renderer.render_subject(&template, &context, None)?
            } else {
                let content_type: ContentType = content_type.parse()?;
                renderer.render_body(&template, &context, content_type, None)?
            };
            println!("{}", output);
            Ok(())
        }
        Commands::SendTest {
            templates: ids,
            to,
            context,
            from_email,
            reply_to,
            cc,
            bcc,
        } => {
            let transport = create_mail_transport(&settings.mail, &settings.smtp)?;
            let users =
                create_user_directory(&settings.storage, &settings.database, postgres_pool.clone());
            let mailer = Mailer::new(templates.clone(), transport, logs.clone(), users);

            let mut selected = Vec::with_capacity(ids.len());
            for id in ids {
                selected.push(templates.get(id).await?);
            }

            let test = TestSend {
                context: match context {
                    Some(json) => parse_context(&json)?,
                    None => merge_contexts(selected.iter().map(|t| &t.test_context)),
                },
                from_email,
                reply_to: reply_to
                    .as_deref()
                    .map(AddressList::parse)
                    .filter(|r| !r.is_empty()),
                to: AddressList::parse(&to),
                cc: cc.as_deref().map(AddressList::parse).unwrap_or_default(),
                bcc: bcc.as_deref().map(AddressList::parse).unwrap_or_default(),
            };

            let outcomes = mailer.send_test(&selected, &test).await;
            for outcome in &outcomes {
                if outcome.success {
                    println!("{}", outcome.message);
                } else {
                    eprintln!("{}", outcome.message);
                }
            }
            let failed = outcomes.iter().filter(|o| !o.success).count();
            if failed > 0 {
                bail!("{} test email(s) failed", failed);
            }
            Ok(())
        }
    };

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }
    result
}

async fn connect(settings: &Settings) -> appmail::error::Result<Option<Arc<PostgresPool>>> {
    match settings.storage.backend {
        StorageBackend::Postgres => {
            let pool = PostgresPool::new(&settings.database).await?;
            pool.ensure_schema().await?;
            tracing::info!(url = %pool.database_url_masked(), "PostgreSQL schema ready");
            Ok(Some(Arc::new(pool)))
        }
        StorageBackend::Memory => Ok(None),
    }
}

fn parse_context(json: &str) -> Result<Context> {
    serde_json::from_str(json).context("Invalid JSON context")
}
