//! Zendesk ticket creation over the REST API.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};

use crate::error::EscalationError;
use crate::escalation::EscalationGateway;
use crate::pipeline::types::{Category, Email, Ticket};

/// Tag added to every ticket opened by this system.
const SOURCE_TAG: &str = "email_automation";

/// Zendesk configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct ZendeskConfig {
    /// Base URL, e.g. `https://acme.zendesk.com`.
    pub base_url: String,
    /// Agent email; API token auth uses `{email}/token` as the username.
    pub email: String,
    pub api_token: SecretString,
    pub timeout: Duration,
}

impl ZendeskConfig {
    /// Build config from environment variables.
    /// Returns `None` if `ZENDESK_DOMAIN` is not set (escalation disabled).
    pub fn from_env() -> Option<Self> {
        let domain = std::env::var("ZENDESK_DOMAIN").ok()?;
        let email = std::env::var("ZENDESK_EMAIL").unwrap_or_default();
        let api_token = std::env::var("ZENDESK_API_TOKEN").unwrap_or_default();
        let timeout_secs: u64 = std::env::var("ZENDESK_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);

        Some(Self {
            base_url: base_url_for(&domain),
            email,
            api_token: SecretString::from(api_token),
            timeout: Duration::from_secs(timeout_secs),
        })
    }
}

/// Accept either a bare domain or a full URL.
fn base_url_for(domain: &str) -> String {
    let domain = domain.trim().trim_end_matches('/');
    if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{domain}")
    }
}

pub struct ZendeskGateway {
    config: ZendeskConfig,
    client: reqwest::Client,
}

impl ZendeskGateway {
    pub fn new(config: ZendeskConfig) -> Result<Self, EscalationError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EscalationError::Request(format!("client build failed: {e}")))?;
        Ok(Self { config, client })
    }

    fn tickets_url(&self) -> String {
        format!("{}/api/v2/tickets.json", self.config.base_url)
    }
}

/// Build the ticket creation payload.
pub fn ticket_payload(email: &Email, category: Category, reason: &str) -> Value {
    let description = format!(
        "Automated handling failed: {reason}\n\n\
         From: {}\nSubject: {}\n\n{}",
        email.sender, email.subject, email.body
    );

    json!({
        "ticket": {
            "subject": format!("Support Request - Email ID {}", email.id),
            "comment": { "body": description },
            "priority": "normal",
            "status": "open",
            "requester": {
                "name": "Customer from Email",
                "email": email.sender,
            },
            "tags": [SOURCE_TAG, category.label()],
        }
    })
}

/// Pull `ticket.id` (number or string) out of a creation response.
pub fn parse_ticket_id(body: &Value) -> Option<String> {
    match body.get("ticket")?.get("id")? {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

#[async_trait]
impl EscalationGateway for ZendeskGateway {
    fn name(&self) -> &str {
        "zendesk"
    }

    async fn create_ticket(
        &self,
        email: &Email,
        category: Category,
        reason: &str,
    ) -> Result<Ticket, EscalationError> {
        let payload = ticket_payload(email, category, reason);

        let resp = self
            .client
            .post(self.tickets_url())
            .basic_auth(
                format!("{}/token", self.config.email),
                Some(self.config.api_token.expose_secret()),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|e| EscalationError::Request(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::error!(
                email_id = %email.id,
                status = status.as_u16(),
                "Zendesk rejected ticket"
            );
            return Err(EscalationError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| EscalationError::Request(format!("invalid response body: {e}")))?;

        let external_id =
            parse_ticket_id(&body).ok_or_else(|| EscalationError::MissingTicketId(body.to_string()))?;

        tracing::info!(email_id = %email.id, ticket_id = %external_id, "Zendesk ticket created");

        Ok(Ticket {
            email_id: email.id.clone(),
            category,
            reason: reason.to_string(),
            external_id,
            created_at: Utc::now(),
        })
    }
}
