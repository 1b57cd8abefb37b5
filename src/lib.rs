//! Email triage pipeline library.

pub mod config;
pub mod delivery;
pub mod error;
pub mod escalation;
pub mod inbound;
pub mod llm;
pub mod pipeline;
pub mod report;
pub mod store;
