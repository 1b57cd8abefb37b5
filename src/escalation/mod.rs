//! Escalation to an external ticketing system.

pub mod zendesk;

pub use zendesk::{ZendeskConfig, ZendeskGateway};

use async_trait::async_trait;

use crate::error::EscalationError;
use crate::pipeline::types::{Category, Email, Ticket};

/// Opens a ticket when automated handling could not complete.
///
/// A failure here is terminal for the email; there is no further fallback.
#[async_trait]
pub trait EscalationGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn create_ticket(
        &self,
        email: &Email,
        category: Category,
        reason: &str,
    ) -> Result<Ticket, EscalationError>;
}

/// Stand-in used when no ticketing system is configured.
///
/// Every escalation fails, so affected emails end with status `error`.
pub struct Unconfigured;

#[async_trait]
impl EscalationGateway for Unconfigured {
    fn name(&self) -> &str {
        "unconfigured"
    }

    async fn create_ticket(
        &self,
        email: &Email,
        _category: Category,
        _reason: &str,
    ) -> Result<Ticket, EscalationError> {
        tracing::warn!(email_id = %email.id, "Escalation requested but no ticketing system configured");
        Err(EscalationError::NotConfigured)
    }
}
