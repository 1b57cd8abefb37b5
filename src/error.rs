//! Error types for the email triage pipeline.

use std::time::Duration;

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },
}

/// Reply generation failed; the orchestrator escalates instead of sending.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("LLM call failed: {0}")]
    Llm(#[from] LlmError),

    #[error("LLM returned an empty reply")]
    EmptyReply,
}

/// Ticket creation failed after an escalation was triggered.
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    #[error("Ticketing request failed: {0}")]
    Request(String),

    #[error("Ticketing system rejected the ticket ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("Ticketing response missing ticket id: {0}")]
    MissingTicketId(String),

    #[error("Ticketing system not configured")]
    NotConfigured,
}

/// Pipeline-related errors.
///
/// Stage failures never surface here; they become outcome data. Only input
/// rejection and a failed write of the final record reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid input for email {email_id}: {reason}")]
    InvalidInput { email_id: String, reason: String },

    #[error("Failed to record outcome for email {email_id}: {source}")]
    Record {
        email_id: String,
        #[source]
        source: DatabaseError,
    },
}
