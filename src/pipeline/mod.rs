//! Email triage pipeline.
//!
//! Every email flows through:
//! 1. `Classifier::classify()`: intent category
//! 2. `Responder::generate_response()`: category-aware reply draft
//! 3. `DeliveryGateway::send()`: one delivery attempt
//! 4. `EscalationGateway::create_ticket()`: when generation or delivery fails
//! 5. `OutcomeStore::record()`: one append-only record per email

pub mod classifier;
pub mod orchestrator;
pub mod prompts;
pub mod responder;
pub mod types;

pub use classifier::Classifier;
pub use orchestrator::Pipeline;
pub use responder::Responder;
