//! End-to-end pipeline behaviour with scripted collaborators.
//!
//! The model, mail transport and ticketing system are replaced by in-process
//! mocks; the outcome log is a real in-memory libSQL database.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use email_triage::delivery::DeliveryGateway;
use email_triage::error::{DatabaseError, EscalationError, LlmError, PipelineError};
use email_triage::escalation::EscalationGateway;
use email_triage::llm::{CompletionRequest, CompletionResponse, LlmProvider};
use email_triage::pipeline::types::{
    Category, DeliveryAttempt, Email, OutcomeRecord, OutcomeStatus, Response, Ticket,
};
use email_triage::pipeline::{Classifier, Pipeline, Responder};
use email_triage::report::OutcomeSummary;
use email_triage::store::{LibSqlBackend, OutcomeStore};

// ── Mocks ───────────────────────────────────────────────────────────

/// Returns the same reply (or the same failure) to every request.
struct ScriptedLlm {
    reply: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedLlm {
    fn replying(text: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(text.to_string()),
            calls: AtomicUsize::new(0),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.reply {
            Some(text) => Ok(CompletionResponse {
                content: text.clone(),
            }),
            None => Err(LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: "service unavailable".into(),
            }),
        }
    }
}

/// Records every send; fails with `error` when set.
struct MockDelivery {
    error: Option<String>,
    sent: Mutex<Vec<(String, Response)>>,
}

impl MockDelivery {
    fn accepting() -> Arc<Self> {
        Arc::new(Self {
            error: None,
            sent: Mutex::new(Vec::new()),
        })
    }

    fn rejecting(error: &str) -> Arc<Self> {
        Arc::new(Self {
            error: Some(error.to_string()),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn attempts(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryGateway for MockDelivery {
    fn name(&self) -> &str {
        "mock-smtp"
    }

    async fn send(&self, recipient: &str, response: &Response) -> DeliveryAttempt {
        self.sent
            .lock()
            .unwrap()
            .push((recipient.to_string(), response.clone()));
        match &self.error {
            None => DeliveryAttempt::sent(recipient),
            Some(e) => DeliveryAttempt::failed(recipient, e.clone()),
        }
    }
}

/// Records every escalation reason; issues `ticket_id` or fails.
struct MockTicketing {
    ticket_id: Option<String>,
    reasons: Mutex<Vec<String>>,
}

impl MockTicketing {
    fn issuing(ticket_id: &str) -> Arc<Self> {
        Arc::new(Self {
            ticket_id: Some(ticket_id.to_string()),
            reasons: Mutex::new(Vec::new()),
        })
    }

    fn down() -> Arc<Self> {
        Arc::new(Self {
            ticket_id: None,
            reasons: Mutex::new(Vec::new()),
        })
    }

    fn reasons(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }
}

#[async_trait]
impl EscalationGateway for MockTicketing {
    fn name(&self) -> &str {
        "mock-tickets"
    }

    async fn create_ticket(
        &self,
        email: &Email,
        category: Category,
        reason: &str,
    ) -> Result<Ticket, EscalationError> {
        self.reasons.lock().unwrap().push(reason.to_string());
        match &self.ticket_id {
            Some(id) => Ok(Ticket {
                email_id: email.id.clone(),
                category,
                reason: reason.to_string(),
                external_id: id.clone(),
                created_at: Utc::now(),
            }),
            None => Err(EscalationError::Request("connection refused".into())),
        }
    }
}

/// A store whose every append fails.
struct BrokenStore;

#[async_trait]
impl OutcomeStore for BrokenStore {
    async fn record(&self, _outcome: &OutcomeRecord) -> Result<(), DatabaseError> {
        Err(DatabaseError::Query("disk I/O error".into()))
    }

    async fn list_outcomes(&self, _limit: usize) -> Result<Vec<OutcomeRecord>, DatabaseError> {
        Ok(Vec::new())
    }

    async fn outcomes_for_email(
        &self,
        _email_id: &str,
    ) -> Result<Vec<OutcomeRecord>, DatabaseError> {
        Ok(Vec::new())
    }

    async fn count_outcomes(&self) -> Result<usize, DatabaseError> {
        Ok(0)
    }
}

// ── Harness ─────────────────────────────────────────────────────────

struct Harness {
    pipeline: Pipeline,
    classify_llm: Arc<ScriptedLlm>,
    reply_llm: Arc<ScriptedLlm>,
    delivery: Arc<MockDelivery>,
    tickets: Arc<MockTicketing>,
    store: Arc<LibSqlBackend>,
}

async fn harness(
    classify_llm: Arc<ScriptedLlm>,
    reply_llm: Arc<ScriptedLlm>,
    delivery: Arc<MockDelivery>,
    tickets: Arc<MockTicketing>,
) -> Harness {
    let store = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let pipeline = Pipeline::new(
        Classifier::new(classify_llm.clone()),
        Responder::new(reply_llm.clone()),
        delivery.clone(),
        tickets.clone(),
        store.clone(),
    );
    Harness {
        pipeline,
        classify_llm,
        reply_llm,
        delivery,
        tickets,
        store,
    }
}

fn delayed_shipment() -> Email {
    Email::new(
        "customer@example.com",
        "Delayed Shipment",
        "I've been waiting two weeks for my order and nobody answers my calls.",
    )
    .with_id("email-001")
}

const APOLOGY: &str = "We're truly sorry your order is late. We've escalated it with our \
    warehouse and will send tracking within 24 hours.\n\nBest regards,\nCustomer Support Team";

// ── Scenarios ───────────────────────────────────────────────────────

#[tokio::test]
async fn scenario_a_delivered_reply_is_sent() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "complaint"}"#),
        ScriptedLlm::replying(APOLOGY),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();

    assert_eq!(record.status, OutcomeStatus::Sent);
    assert_eq!(record.category, Category::Complaint);
    assert!(!record.category_defaulted);
    assert!(record.ticket.is_none());

    let response = record.response.as_ref().unwrap();
    assert!(!response.body.trim().is_empty());
    assert_eq!(response.subject, "Regarding Your Complaint");
    assert!(record.delivery.as_ref().unwrap().is_sent());

    let sent = h.delivery.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, "customer@example.com");
    assert!(h.tickets.reasons().is_empty());

    assert_eq!(h.store.count_outcomes().await.unwrap(), 1);
}

#[tokio::test]
async fn scenario_b_delivery_failure_escalates_with_delivery_error() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "complaint"}"#),
        ScriptedLlm::replying(APOLOGY),
        MockDelivery::rejecting("auth error"),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();

    assert_eq!(record.status, OutcomeStatus::Escalated);
    let ticket = record.ticket.as_ref().unwrap();
    assert_eq!(ticket.external_id, "T-100");
    assert_eq!(ticket.reason, "auth error");
    assert_eq!(record.delivery_error.as_deref(), Some("auth error"));
    assert!(record.response.is_some());
    assert!(!record.delivery.as_ref().unwrap().is_sent());

    assert_eq!(h.delivery.attempts(), 1);
    assert_eq!(h.tickets.reasons(), vec!["auth error".to_string()]);
}

#[tokio::test]
async fn scenario_c_generation_failure_escalates_without_response() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "complaint"}"#),
        ScriptedLlm::failing(),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();

    assert_eq!(record.status, OutcomeStatus::Escalated);
    assert_eq!(record.ticket.as_ref().unwrap().reason, "generation failed");
    assert!(record.response.is_none());
    assert!(record.delivery.is_none());
    assert!(record.generation_error.is_some());

    assert_eq!(h.delivery.attempts(), 0);
    assert_eq!(h.reply_llm.calls(), 1);

    let json = serde_json::to_value(&record).unwrap();
    assert!(json["response"].is_null());
    assert!(json.as_object().unwrap().contains_key("response"));
}

#[tokio::test]
async fn empty_reply_counts_as_generation_failure() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "inquiry"}"#),
        ScriptedLlm::replying("   \n "),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-101"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();
    assert_eq!(record.status, OutcomeStatus::Escalated);
    assert_eq!(record.ticket.unwrap().reason, "generation failed");
    assert_eq!(h.delivery.attempts(), 0);
}

#[tokio::test]
async fn scenario_d_delivery_and_escalation_failure_is_error() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "complaint"}"#),
        ScriptedLlm::replying(APOLOGY),
        MockDelivery::rejecting("auth error"),
        MockTicketing::down(),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();

    assert_eq!(record.status, OutcomeStatus::Error);
    assert!(record.ticket.is_none());
    assert_eq!(record.delivery_error.as_deref(), Some("auth error"));
    assert!(
        record
            .escalation_error
            .as_deref()
            .unwrap()
            .contains("connection refused")
    );

    assert_eq!(h.delivery.attempts(), 1);
    assert_eq!(h.tickets.reasons().len(), 1);

    let stored = h.store.outcomes_for_email("email-001").await.unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0], record);
}

#[tokio::test]
async fn generation_and_escalation_failure_is_error() {
    let h = harness(
        ScriptedLlm::replying("complaint"),
        ScriptedLlm::failing(),
        MockDelivery::accepting(),
        MockTicketing::down(),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();
    assert_eq!(record.status, OutcomeStatus::Error);
    assert!(record.generation_error.is_some());
    assert!(record.escalation_error.is_some());
    assert!(record.response.is_none());
}

// ── Properties ──────────────────────────────────────────────────────

#[tokio::test]
async fn empty_email_is_rejected_before_any_external_call() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "complaint"}"#),
        ScriptedLlm::replying(APOLOGY),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let email = Email::new("customer@example.com", "", "  ");
    let err = h.pipeline.process(&email).await.unwrap_err();

    assert!(matches!(err, PipelineError::InvalidInput { .. }));
    assert_eq!(h.classify_llm.calls(), 0);
    assert_eq!(h.reply_llm.calls(), 0);
    assert_eq!(h.delivery.attempts(), 0);
    assert!(h.tickets.reasons().is_empty());
    assert_eq!(h.store.count_outcomes().await.unwrap(), 0);
}

#[tokio::test]
async fn unrecognized_classification_defaults_to_other() {
    let h = harness(
        ScriptedLlm::replying("I think this is probably spam?"),
        ScriptedLlm::replying("Thanks for reaching out."),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();
    assert_eq!(record.category, Category::Other);
    assert!(record.category_defaulted);
    assert_eq!(record.status, OutcomeStatus::Sent);
    assert_eq!(
        record.response.unwrap().subject,
        "Regarding Your Message"
    );
}

#[tokio::test]
async fn classifier_outage_still_produces_a_record() {
    let h = harness(
        ScriptedLlm::failing(),
        ScriptedLlm::replying("Thanks for reaching out."),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();
    assert_eq!(record.category, Category::Other);
    assert!(record.category_defaulted);
    assert_eq!(h.classify_llm.calls(), 1);
}

#[tokio::test]
async fn status_escalated_iff_ticket_exists() {
    let cases = [
        (MockDelivery::accepting(), MockTicketing::issuing("T-1")),
        (MockDelivery::rejecting("timeout"), MockTicketing::issuing("T-2")),
        (MockDelivery::rejecting("timeout"), MockTicketing::down()),
    ];

    for (delivery, tickets) in cases {
        let h = harness(
            ScriptedLlm::replying(r#"{"category": "inquiry"}"#),
            ScriptedLlm::replying("Here is the information you asked for."),
            delivery,
            tickets,
        )
        .await;
        let record = h.pipeline.process(&delayed_shipment()).await.unwrap();

        assert_eq!(
            record.status == OutcomeStatus::Escalated,
            record.ticket.is_some()
        );
        if record.delivery.as_ref().unwrap().is_sent() {
            assert_eq!(record.status, OutcomeStatus::Sent);
        }
        assert_eq!(h.store.count_outcomes().await.unwrap(), 1);
    }
}

#[tokio::test]
async fn serialized_record_keeps_absent_fields_as_null() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "feedback"}"#),
        ScriptedLlm::replying("Thank you for the kind words!"),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let record = h.pipeline.process(&delayed_shipment()).await.unwrap();
    let json = serde_json::to_value(&record).unwrap();
    let obj = json.as_object().unwrap();

    for key in [
        "ticket",
        "generation_error",
        "delivery_error",
        "escalation_error",
    ] {
        assert!(obj.contains_key(key), "missing key {key}");
        assert!(obj[key].is_null(), "{key} should be null");
    }
    assert_eq!(obj["status"], "sent");
    assert_eq!(obj["category"], "feedback");
}

#[tokio::test]
async fn failed_record_write_is_reported() {
    let pipeline = Pipeline::new(
        Classifier::new(ScriptedLlm::replying("inquiry")),
        Responder::new(ScriptedLlm::replying("Sure, here you go.")),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
        Arc::new(BrokenStore),
    );

    let err = pipeline.process(&delayed_shipment()).await.unwrap_err();
    match err {
        PipelineError::Record { email_id, source } => {
            assert_eq!(email_id, "email-001");
            assert!(source.to_string().contains("disk I/O error"));
        }
        other => panic!("expected Record error, got {other:?}"),
    }
}

// ── Batches ─────────────────────────────────────────────────────────

fn batch() -> Vec<Email> {
    vec![
        Email::new("a@example.com", "Where is my order?", "Order 123").with_id("b1"),
        Email::new("b@example.com", "", "").with_id("b2"),
        Email::new("c@example.com", "Love it", "Great product").with_id("b3"),
    ]
}

#[tokio::test]
async fn batch_skips_invalid_emails_and_records_the_rest() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "inquiry"}"#),
        ScriptedLlm::replying("Thanks, we're on it."),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let results = h.pipeline.process_batch(&batch()).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(matches!(
        results[1],
        Err(PipelineError::InvalidInput { .. })
    ));
    assert!(results[2].is_ok());
    assert_eq!(h.store.count_outcomes().await.unwrap(), 2);
    assert_eq!(h.delivery.attempts(), 2);
}

#[tokio::test]
async fn concurrent_processing_keeps_one_record_per_email() {
    let h = harness(
        ScriptedLlm::replying(r#"{"category": "support_request"}"#),
        ScriptedLlm::replying("Please try resetting your password."),
        MockDelivery::rejecting("connection refused"),
        MockTicketing::issuing("T-200"),
    )
    .await;

    let emails: Vec<Email> = (0..12)
        .map(|i| {
            Email::new("user@example.com", format!("Login issue {i}"), "Cannot log in")
                .with_id(format!("c{i}"))
        })
        .collect();

    let results = h.pipeline.process_concurrent(&emails, 4).await;

    assert_eq!(results.len(), emails.len());
    for (email, result) in emails.iter().zip(&results) {
        let record = result.as_ref().unwrap();
        assert_eq!(record.email_id, email.id);
        assert_eq!(record.status, OutcomeStatus::Escalated);
    }
    assert_eq!(h.store.count_outcomes().await.unwrap(), 12);
    assert_eq!(h.tickets.reasons().len(), 12);

    let summary = OutcomeSummary::from_store(h.store.as_ref(), 100).await.unwrap();
    assert_eq!(summary.escalated, 12);
    assert_eq!(summary.by_category[&Category::SupportRequest], 12);
}

#[tokio::test]
async fn reprocessing_an_email_appends_a_new_record() {
    let h = harness(
        ScriptedLlm::replying("complaint"),
        ScriptedLlm::replying(APOLOGY),
        MockDelivery::accepting(),
        MockTicketing::issuing("T-100"),
    )
    .await;

    let email = delayed_shipment();
    let first = h.pipeline.process(&email).await.unwrap();
    let second = h.pipeline.process(&email).await.unwrap();

    assert_ne!(first.id, second.id);
    let history = h.store.outcomes_for_email(&email.id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, first.id);
}
