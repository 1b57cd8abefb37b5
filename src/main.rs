use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use email_triage::config::{self, AppConfig};
use email_triage::delivery::{DeliveryGateway, SmtpGateway};
use email_triage::error::PipelineError;
use email_triage::escalation::{EscalationGateway, Unconfigured, ZendeskGateway};
use email_triage::inbound;
use email_triage::llm::create_provider;
use email_triage::pipeline::Pipeline;
use email_triage::report::OutcomeSummary;
use email_triage::store::{LibSqlBackend, OutcomeStore};

const USAGE: &str = "\
Usage:
  email-triage process <file>...     Run emails (.json or .eml) through the pipeline
  email-triage summary [limit]       Summarize the most recent outcomes (default 1000)
  email-triage history <email-id>    Print every outcome recorded for one email";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow::anyhow!("Failed to install rustls crypto provider"))?;

    let _log_guard = init_tracing(config::log_dir_from_env().as_deref())?;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("process") => process(&args[1..]).await,
        Some("summary") => {
            let limit = match args.get(1) {
                Some(raw) => raw
                    .parse()
                    .with_context(|| format!("invalid limit '{raw}'"))?,
                None => 1000,
            };
            summary(limit).await
        }
        Some("history") => match args.get(1) {
            Some(email_id) => history(email_id).await,
            None => bail!("missing email id\n\n{USAGE}"),
        },
        Some("-h" | "--help") => {
            println!("{USAGE}");
            Ok(())
        }
        Some(other) => bail!("unknown command '{other}'\n\n{USAGE}"),
        None => bail!("missing command\n\n{USAGE}"),
    }
}

/// Console logging filtered by `RUST_LOG` (default `info`), plus a daily
/// rolling file when a log directory is configured.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "email-triage.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .init();
    Ok(guard)
}

async fn open_store(path: &Path) -> anyhow::Result<Arc<LibSqlBackend>> {
    let store = LibSqlBackend::new_local(path)
        .await
        .with_context(|| format!("opening outcome log at {}", path.display()))?;
    Ok(Arc::new(store))
}

async fn process(files: &[String]) -> anyhow::Result<()> {
    if files.is_empty() {
        bail!("no input files\n\n{USAGE}");
    }

    let config = AppConfig::from_env().context("loading configuration")?;

    let mut emails = Vec::new();
    for file in files {
        let path = PathBuf::from(file);
        let loaded =
            inbound::load_emails(&path).with_context(|| format!("reading {}", path.display()))?;
        emails.extend(loaded);
    }

    let llm = create_provider(&config.llm)?;
    let delivery: Arc<dyn DeliveryGateway> = Arc::new(SmtpGateway::new(config.smtp.clone()));
    let escalation: Arc<dyn EscalationGateway> = match config.zendesk.clone() {
        Some(zendesk) => Arc::new(ZendeskGateway::new(zendesk)?),
        None => {
            tracing::warn!("ZENDESK_DOMAIN not set, escalations will be recorded as errors");
            Arc::new(Unconfigured)
        }
    };
    let store = open_store(&config.db_path).await?;

    tracing::info!(
        emails = emails.len(),
        model = llm.model_name(),
        concurrency = config.concurrency,
        db = %config.db_path.display(),
        "Starting triage run"
    );

    let pipeline = Pipeline::with_provider(llm, delivery, escalation, store);
    let results = if config.concurrency > 1 {
        pipeline.process_concurrent(&emails, config.concurrency).await
    } else {
        pipeline.process_batch(&emails).await
    };

    let mut records = Vec::new();
    let mut rejected = 0usize;
    let mut unrecorded = 0usize;
    for result in results {
        match result {
            Ok(record) => {
                println!("{}", serde_json::to_string(&record)?);
                records.push(record);
            }
            Err(PipelineError::InvalidInput { email_id, reason }) => {
                eprintln!("rejected {email_id}: {reason}");
                rejected += 1;
            }
            Err(e @ PipelineError::Record { .. }) => {
                eprintln!("{e}");
                unrecorded += 1;
            }
        }
    }

    eprint!("{}", OutcomeSummary::from_records(&records));
    if rejected > 0 {
        eprintln!("Rejected (invalid input): {rejected}");
    }
    if unrecorded > 0 {
        bail!("{unrecorded} outcome(s) could not be recorded");
    }
    Ok(())
}

async fn summary(limit: usize) -> anyhow::Result<()> {
    let store = open_store(&config::db_path_from_env()).await?;
    let summary = OutcomeSummary::from_store(store.as_ref(), limit).await?;
    print!("{summary}");
    Ok(())
}

async fn history(email_id: &str) -> anyhow::Result<()> {
    let store = open_store(&config::db_path_from_env()).await?;
    let records = store.outcomes_for_email(email_id).await?;
    if records.is_empty() {
        eprintln!("no outcomes recorded for {email_id}");
    }
    for record in records {
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}
