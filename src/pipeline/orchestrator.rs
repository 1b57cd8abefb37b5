//! Pipeline orchestrator: drives one email from receipt to a recorded outcome.
//!
//! Per email:
//! 1. `Classifier::classify()`: category (never fails for valid input)
//! 2. `Responder::generate_response()`: reply draft
//! 3. `DeliveryGateway::send()`: one delivery attempt
//! 4. `EscalationGateway::create_ticket()`: only after generation or
//!    delivery failure
//! 5. `OutcomeStore::record()`: exactly one append per processed email
//!
//! Every external call is made at most once. Stage failures become fields
//! of the outcome record instead of errors.

use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::delivery::DeliveryGateway;
use crate::error::PipelineError;
use crate::escalation::EscalationGateway;
use crate::llm::LlmProvider;
use crate::pipeline::classifier::Classifier;
use crate::pipeline::responder::Responder;
use crate::pipeline::types::{
    Category, Classification, DeliveryAttempt, Email, OutcomeRecord, OutcomeStatus, PipelineState,
    Response, Ticket,
};
use crate::store::OutcomeStore;

/// Escalation reason used when no reply could be generated.
pub const GENERATION_FAILED_REASON: &str = "generation failed";

/// Escalation reason used when a failed attempt carries no detail.
const DELIVERY_FAILED_REASON: &str = "delivery failed";

pub struct Pipeline {
    classifier: Classifier,
    responder: Responder,
    delivery: Arc<dyn DeliveryGateway>,
    escalation: Arc<dyn EscalationGateway>,
    store: Arc<dyn OutcomeStore>,
}

impl Pipeline {
    pub fn new(
        classifier: Classifier,
        responder: Responder,
        delivery: Arc<dyn DeliveryGateway>,
        escalation: Arc<dyn EscalationGateway>,
        store: Arc<dyn OutcomeStore>,
    ) -> Self {
        Self {
            classifier,
            responder,
            delivery,
            escalation,
            store,
        }
    }

    /// Build a pipeline whose classifier and responder share one provider.
    pub fn with_provider(
        llm: Arc<dyn LlmProvider>,
        delivery: Arc<dyn DeliveryGateway>,
        escalation: Arc<dyn EscalationGateway>,
        store: Arc<dyn OutcomeStore>,
    ) -> Self {
        Self::new(
            Classifier::new(Arc::clone(&llm)),
            Responder::new(llm),
            delivery,
            escalation,
            store,
        )
    }

    /// Process one email and append its outcome record.
    ///
    /// Returns `InvalidInput` (no record written, no external call made) for
    /// an email with neither subject nor body, and `Record` if the final
    /// append fails. Everything else is reported through the record.
    pub async fn process(&self, email: &Email) -> Result<OutcomeRecord, PipelineError> {
        let mut run = Run::start(email);

        let classification = self.classifier.classify(email).await?;
        run.classified(&classification);

        match self
            .responder
            .generate_response(email, classification.category)
            .await
        {
            Ok(response) => {
                run.advance(PipelineState::Responded);
                let attempt = self.delivery.send(&email.sender, &response).await;
                run.response = Some(response);

                if attempt.is_sent() {
                    info!(email_id = %email.id, gateway = self.delivery.name(), "Reply delivered");
                    run.delivery = Some(attempt);
                    run.advance(PipelineState::Delivered);
                } else {
                    let reason = attempt
                        .error
                        .clone()
                        .unwrap_or_else(|| DELIVERY_FAILED_REASON.to_string());
                    warn!(email_id = %email.id, error = %reason, "Delivery failed, escalating");
                    run.delivery_error = Some(reason.clone());
                    run.delivery = Some(attempt);
                    self.escalate(&mut run, email, &reason).await;
                }
            }
            Err(e) => {
                warn!(email_id = %email.id, error = %e, "Reply generation failed, escalating");
                run.advance(PipelineState::GenerationFailed);
                run.generation_error = Some(e.to_string());
                self.escalate(&mut run, email, GENERATION_FAILED_REASON)
                    .await;
            }
        }

        let record = run.finish();
        self.store
            .record(&record)
            .await
            .map_err(|source| {
                error!(email_id = %email.id, error = %source, "Failed to record outcome");
                PipelineError::Record {
                    email_id: email.id.clone(),
                    source,
                }
            })?;

        info!(
            email_id = %record.email_id,
            category = %record.category,
            status = %record.status,
            "Email processed"
        );
        Ok(record)
    }

    async fn escalate(&self, run: &mut Run, email: &Email, reason: &str) {
        match self
            .escalation
            .create_ticket(email, run.category, reason)
            .await
        {
            Ok(ticket) => {
                info!(
                    email_id = %email.id,
                    ticket_id = %ticket.external_id,
                    gateway = self.escalation.name(),
                    "Escalated to ticket"
                );
                run.ticket = Some(ticket);
                run.advance(PipelineState::Escalated);
            }
            Err(e) => {
                error!(email_id = %email.id, error = %e, "Escalation failed");
                run.escalation_error = Some(e.to_string());
                run.advance(PipelineState::Errored);
            }
        }
    }

    /// Process emails one after another, in input order.
    ///
    /// Invalid emails are logged and reported as errors without a record;
    /// the rest of the batch continues.
    pub async fn process_batch(&self, emails: &[Email]) -> Vec<Result<OutcomeRecord, PipelineError>> {
        let mut results = Vec::with_capacity(emails.len());
        for email in emails {
            let result = self.process(email).await;
            if let Err(ref e) = result {
                warn!(email_id = %email.id, error = %e, "Email skipped");
            }
            results.push(result);
        }
        results
    }

    /// Process distinct emails with at most `limit` in flight.
    ///
    /// Stages of a single email still run in order; results come back in
    /// input order.
    pub async fn process_concurrent(
        &self,
        emails: &[Email],
        limit: usize,
    ) -> Vec<Result<OutcomeRecord, PipelineError>> {
        stream::iter(emails.iter().map(|email| async move {
            let result = self.process(email).await;
            if let Err(ref e) = result {
                warn!(email_id = %email.id, error = %e, "Email skipped");
            }
            result
        }))
        .buffered(limit.max(1))
        .collect()
        .await
    }
}

/// In-flight state for one email, finished into an `OutcomeRecord`.
struct Run {
    state: PipelineState,
    email_id: String,
    sender: String,
    subject: String,
    category: Category,
    category_defaulted: bool,
    response: Option<Response>,
    delivery: Option<DeliveryAttempt>,
    ticket: Option<Ticket>,
    generation_error: Option<String>,
    delivery_error: Option<String>,
    escalation_error: Option<String>,
    started_at: chrono::DateTime<Utc>,
}

impl Run {
    fn start(email: &Email) -> Self {
        Self {
            state: PipelineState::Received,
            email_id: email.id.clone(),
            sender: email.sender.clone(),
            subject: email.subject.clone(),
            category: Category::Other,
            category_defaulted: false,
            response: None,
            delivery: None,
            ticket: None,
            generation_error: None,
            delivery_error: None,
            escalation_error: None,
            started_at: Utc::now(),
        }
    }

    fn classified(&mut self, classification: &Classification) {
        self.category = classification.category;
        self.category_defaulted = classification.defaulted;
        self.advance(PipelineState::Classified);
    }

    fn advance(&mut self, next: PipelineState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal transition {} -> {}",
            self.state.label(),
            next.label()
        );
        debug!(
            email_id = %self.email_id,
            from = self.state.label(),
            to = next.label(),
            "Pipeline transition"
        );
        self.state = next;
    }

    fn finish(self) -> OutcomeRecord {
        debug_assert!(self.state.is_terminal());
        let status = self.state.status().unwrap_or(OutcomeStatus::Error);
        OutcomeRecord {
            id: Uuid::new_v4(),
            email_id: self.email_id,
            sender: self.sender,
            subject: self.subject,
            category: self.category,
            category_defaulted: self.category_defaulted,
            response: self.response,
            delivery: self.delivery,
            ticket: self.ticket,
            status,
            generation_error: self.generation_error,
            delivery_error: self.delivery_error,
            escalation_error: self.escalation_error,
            started_at: self.started_at,
            completed_at: Utc::now(),
        }
    }
}
