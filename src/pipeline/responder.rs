//! Responder: drafts a category-aware reply with the LLM.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::GenerationError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts;
use crate::pipeline::types::{Category, Email, Response};

/// Slight variation keeps replies from sounding canned.
const RESPONSE_TEMPERATURE: f32 = 0.3;

const RESPONSE_MAX_TOKENS: u32 = 400;

pub struct Responder {
    llm: Arc<dyn LlmProvider>,
}

impl Responder {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Generate a reply for `email` in the tone of `category`.
    ///
    /// Provider errors and empty output are both `GenerationError`.
    pub async fn generate_response(
        &self,
        email: &Email,
        category: Category,
    ) -> Result<Response, GenerationError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::response_system_prompt(category)),
            ChatMessage::user(prompts::response_user_prompt(email)),
        ])
        .with_temperature(RESPONSE_TEMPERATURE)
        .with_max_tokens(RESPONSE_MAX_TOKENS);

        let response = self.llm.complete(request).await.map_err(|e| {
            warn!(email_id = %email.id, error = %e, "Reply generation failed");
            GenerationError::Llm(e)
        })?;

        let body = response.content.trim();
        if body.is_empty() {
            warn!(email_id = %email.id, "LLM returned an empty reply");
            return Err(GenerationError::EmptyReply);
        }

        info!(
            email_id = %email.id,
            category = %category,
            chars = body.len(),
            "Reply generated"
        );

        Ok(Response {
            email_id: email.id.clone(),
            category,
            subject: prompts::template(category).reply_subject.to_string(),
            body: body.to_string(),
            generated_at: Utc::now(),
        })
    }
}
