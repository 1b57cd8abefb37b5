//! SMTP delivery via lettre.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::delivery::DeliveryGateway;
use crate::pipeline::types::{DeliveryAttempt, Response};

// ── Configuration ───────────────────────────────────────────────────

/// How the SMTP connection is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpSecurity {
    /// Plain connection upgraded with STARTTLS.
    StartTls,
    /// Implicit TLS from the first byte.
    Tls,
    /// No encryption. Local relays and tests only.
    None,
}

impl SmtpSecurity {
    fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "tls" | "ssl" => Self::Tls,
            "none" | "plain" => Self::None,
            _ => Self::StartTls,
        }
    }
}

/// SMTP configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub security: SmtpSecurity,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    pub timeout: Duration,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `None` if `EMAIL_SMTP_HOST` is not set (delivery disabled).
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup; `from_env` passes the process env.
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let host = var("EMAIL_SMTP_HOST")?;

        let port: u16 = var("EMAIL_SMTP_PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(587);

        let security = var("EMAIL_SMTP_SECURITY")
            .map(|s| SmtpSecurity::parse(&s))
            .unwrap_or(SmtpSecurity::StartTls);

        let username = var("EMAIL_USERNAME").unwrap_or_default();
        let password = var("EMAIL_PASSWORD").unwrap_or_default();
        let from_address =
            var("EMAIL_FROM_ADDRESS").unwrap_or_else(|| "noreply@example.com".into());

        let timeout_secs: u64 = var("EMAIL_SMTP_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Some(Self {
            host,
            port,
            security,
            username,
            password: SecretString::from(password),
            from_address,
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

// ── Gateway ─────────────────────────────────────────────────────────

pub struct SmtpGateway {
    config: SmtpConfig,
}

impl SmtpGateway {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    /// Build the outgoing message. Fails on unparseable addresses.
    pub fn build_message(&self, recipient: &str, response: &Response) -> Result<Message, String> {
        Message::builder()
            .from(
                self.config
                    .from_address
                    .parse()
                    .map_err(|e| format!("Invalid from address: {e}"))?,
            )
            .to(recipient
                .parse()
                .map_err(|e| format!("Invalid to address: {e}"))?)
            .subject(&response.subject)
            .body(response.body.clone())
            .map_err(|e| format!("Failed to build email: {e}"))
    }

    fn transport(&self) -> Result<SmtpTransport, String> {
        let builder = match self.config.security {
            SmtpSecurity::StartTls => SmtpTransport::starttls_relay(&self.config.host)
                .map_err(|e| format!("SMTP relay error: {e}"))?,
            SmtpSecurity::Tls => SmtpTransport::relay(&self.config.host)
                .map_err(|e| format!("SMTP relay error: {e}"))?,
            SmtpSecurity::None => SmtpTransport::builder_dangerous(&self.config.host),
        };

        let mut builder = builder
            .port(self.config.port)
            .timeout(Some(self.config.timeout));

        if !self.config.username.is_empty() {
            builder = builder.credentials(Credentials::new(
                self.config.username.clone(),
                self.config.password.expose_secret().to_string(),
            ));
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl DeliveryGateway for SmtpGateway {
    fn name(&self) -> &str {
        "smtp"
    }

    async fn send(&self, recipient: &str, response: &Response) -> DeliveryAttempt {
        let message = match self.build_message(recipient, response) {
            Ok(message) => message,
            Err(reason) => {
                tracing::warn!(email_id = %response.email_id, %reason, "Reply not sendable");
                return DeliveryAttempt::failed(recipient, reason);
            }
        };

        let transport = match self.transport() {
            Ok(transport) => transport,
            Err(reason) => return DeliveryAttempt::failed(recipient, reason),
        };

        // lettre's SmtpTransport is blocking; its own timeout bounds the call.
        let result =
            tokio::task::spawn_blocking(move || transport.send(&message).map(|_| ())).await;

        match result {
            Ok(Ok(())) => {
                tracing::info!(email_id = %response.email_id, "Email sent to {recipient}");
                DeliveryAttempt::sent(recipient)
            }
            Ok(Err(e)) => {
                tracing::error!(email_id = %response.email_id, error = %e, "SMTP send failed");
                DeliveryAttempt::failed(recipient, format!("SMTP send failed: {e}"))
            }
            Err(e) => {
                tracing::error!(email_id = %response.email_id, error = %e, "SMTP task panicked");
                DeliveryAttempt::failed(recipient, format!("SMTP task failed: {e}"))
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────
