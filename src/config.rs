//! Application configuration, assembled from environment variables.

use std::path::PathBuf;

use crate::delivery::SmtpConfig;
use crate::error::ConfigError;
use crate::escalation::ZendeskConfig;
use crate::llm::LlmConfig;

const DEFAULT_DB_PATH: &str = "./data/email-triage.db";

/// Everything the binary needs to build a pipeline.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub smtp: SmtpConfig,
    /// `None` when `ZENDESK_DOMAIN` is unset; escalations then fail and
    /// the affected emails are recorded with status `error`.
    pub zendesk: Option<ZendeskConfig>,
    pub db_path: PathBuf,
    /// Daily rolling log files are written here when set.
    pub log_dir: Option<PathBuf>,
    /// Emails processed at once. 1 means strictly sequential.
    pub concurrency: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let llm = LlmConfig::from_env()?;
        let smtp = SmtpConfig::from_env()
            .ok_or_else(|| ConfigError::MissingEnvVar("EMAIL_SMTP_HOST".into()))?;
        let zendesk = ZendeskConfig::from_env();

        Ok(Self {
            llm,
            smtp,
            zendesk,
            db_path: db_path_from_env(),
            log_dir: log_dir_from_env(),
            concurrency: concurrency_from_env()?,
        })
    }
}

/// Outcome log location; reading the log needs no other configuration.
pub fn db_path_from_env() -> PathBuf {
    std::env::var("EMAIL_TRIAGE_DB_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH))
}

pub fn log_dir_from_env() -> Option<PathBuf> {
    std::env::var("EMAIL_TRIAGE_LOG_DIR")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .map(PathBuf::from)
}

fn concurrency_from_env() -> Result<usize, ConfigError> {
    match std::env::var("EMAIL_TRIAGE_CONCURRENCY") {
        Ok(raw) => parse_concurrency(&raw),
        Err(_) => Ok(1),
    }
}

fn parse_concurrency(raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            key: "EMAIL_TRIAGE_CONCURRENCY".into(),
            message: format!("expected a positive integer, got '{raw}'"),
        }),
    }
}
