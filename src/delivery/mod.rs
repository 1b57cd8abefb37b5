//! Outbound reply delivery.

pub mod smtp;

pub use smtp::{SmtpConfig, SmtpGateway, SmtpSecurity};

use async_trait::async_trait;

use crate::pipeline::types::{DeliveryAttempt, Response};

/// Sends a generated reply through an external mail transport.
///
/// Exactly one attempt per call, no retries. Transport failures are
/// returned as a failed `DeliveryAttempt`, never as an error.
#[async_trait]
pub trait DeliveryGateway: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, recipient: &str, response: &Response) -> DeliveryAttempt;
}
