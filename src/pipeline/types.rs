//! Shared types for the email processing pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::PipelineError;

// ── Email ───────────────────────────────────────────────────────────

/// Inbound email. Immutable input to the pipeline.
///
/// Deserializes from the `{"id", "from", "subject", "body"}` shape used by
/// the input files; a missing id is replaced by a generated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
    #[serde(default = "generate_email_id")]
    pub id: String,
    #[serde(rename = "from", alias = "sender")]
    pub sender: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub body: String,
    #[serde(default = "Utc::now", alias = "timestamp")]
    pub received_at: DateTime<Utc>,
}

fn generate_email_id() -> String {
    Uuid::new_v4().to_string()
}

impl Email {
    pub fn new(
        sender: impl Into<String>,
        subject: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_email_id(),
            sender: sender.into(),
            subject: subject.into(),
            body: body.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Reject emails with neither a subject nor a body.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.subject.trim().is_empty() && self.body.trim().is_empty() {
            return Err(PipelineError::InvalidInput {
                email_id: self.id.clone(),
                reason: "email has an empty subject and an empty body".into(),
            });
        }
        Ok(())
    }
}

// ── Category ────────────────────────────────────────────────────────

/// Intent category assigned by the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Complaint,
    Inquiry,
    Feedback,
    SupportRequest,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Complaint,
        Category::Inquiry,
        Category::Feedback,
        Category::SupportRequest,
        Category::Other,
    ];

    /// Wire label, as stored and as requested from the model.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Complaint => "complaint",
            Self::Inquiry => "inquiry",
            Self::Feedback => "feedback",
            Self::SupportRequest => "support_request",
            Self::Other => "other",
        }
    }

    /// Parse a label leniently: case, surrounding whitespace/quotes, and
    /// space or hyphen separators are ignored. Returns `None` for anything
    /// outside the five known labels.
    pub fn from_label(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .trim_matches(|c| c == '"' || c == '\'' || c == '.')
            .trim()
            .to_lowercase()
            .replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|c| c.label() == normalized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifier output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: Category,
    /// True when provider output was unusable and `Other` was substituted.
    pub defaulted: bool,
    /// Raw provider text, when a call succeeded.
    pub raw: Option<String>,
}

// ── Response ────────────────────────────────────────────────────────

/// Generated reply for one email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub email_id: String,
    pub category: Category,
    pub subject: String,
    pub body: String,
    pub generated_at: DateTime<Utc>,
}

// ── Delivery ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryOutcome {
    Sent,
    Failed,
}

/// Result of the single delivery attempt for an email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryAttempt {
    pub recipient: String,
    pub outcome: DeliveryOutcome,
    pub error: Option<String>,
    pub attempted_at: DateTime<Utc>,
}

impl DeliveryAttempt {
    pub fn sent(recipient: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            outcome: DeliveryOutcome::Sent,
            error: None,
            attempted_at: Utc::now(),
        }
    }

    pub fn failed(recipient: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            recipient: recipient.into(),
            outcome: DeliveryOutcome::Failed,
            error: Some(error.into()),
            attempted_at: Utc::now(),
        }
    }

    pub fn is_sent(&self) -> bool {
        self.outcome == DeliveryOutcome::Sent
    }
}

// ── Ticket ──────────────────────────────────────────────────────────

/// Ticket opened in the external ticketing system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    pub email_id: String,
    pub category: Category,
    pub reason: String,
    pub external_id: String,
    pub created_at: DateTime<Utc>,
}

// ── Outcome ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Sent,
    Escalated,
    Error,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Escalated => "escalated",
            Self::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "escalated" => Some(Self::Escalated),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable audit entry for one processed email.
///
/// Every field is always serialized; stages that never ran are `null`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeRecord {
    pub id: Uuid,
    pub email_id: String,
    pub sender: String,
    pub subject: String,
    pub category: Category,
    pub category_defaulted: bool,
    pub response: Option<Response>,
    pub delivery: Option<DeliveryAttempt>,
    pub ticket: Option<Ticket>,
    pub status: OutcomeStatus,
    pub generation_error: Option<String>,
    pub delivery_error: Option<String>,
    pub escalation_error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

// ── State machine ───────────────────────────────────────────────────

/// Per-email pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Received,
    Classified,
    Responded,
    GenerationFailed,
    Delivered,
    Escalated,
    Errored,
}

impl PipelineState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classified => "classified",
            Self::Responded => "responded",
            Self::GenerationFailed => "generation_failed",
            Self::Delivered => "delivered",
            Self::Escalated => "escalated",
            Self::Errored => "errored",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Escalated | Self::Errored)
    }

    /// Whether `next` is a legal successor of `self`.
    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Received, Classified)
                | (Classified, Responded)
                | (Classified, GenerationFailed)
                | (Responded, Delivered)
                | (Responded, Escalated)
                | (Responded, Errored)
                | (GenerationFailed, Escalated)
                | (GenerationFailed, Errored)
        )
    }

    /// Terminal status for a terminal state.
    pub fn status(&self) -> Option<OutcomeStatus> {
        match self {
            Self::Delivered => Some(OutcomeStatus::Sent),
            Self::Escalated => Some(OutcomeStatus::Escalated),
            Self::Errored => Some(OutcomeStatus::Error),
            _ => None,
        }
    }
}
