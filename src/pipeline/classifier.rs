//! Classifier: assigns one of five intent categories to an email.
//!
//! Provider output is never trusted as typed data: it is parsed into a
//! validated `Category`, and anything unusable becomes `Other`.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts;
use crate::pipeline::types::{Category, Classification, Email};

/// Classification should be deterministic.
const CLASSIFY_TEMPERATURE: f32 = 0.0;

/// The expected answer is a one-field JSON object.
const CLASSIFY_MAX_TOKENS: u32 = 64;

/// Keys the model has been seen to use for the label.
const LABEL_KEYS: [&str; 2] = ["category", "classification"];

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[a-zA-Z]*\s*(.*?)\s*```").unwrap());

pub struct Classifier {
    llm: Arc<dyn LlmProvider>,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Classify an email.
    ///
    /// Fails only for an email with neither subject nor body, before any
    /// provider call. Provider errors and malformed output fall back to
    /// `Category::Other` with `defaulted` set.
    pub async fn classify(&self, email: &Email) -> Result<Classification, PipelineError> {
        email.validate()?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(prompts::classification_system_prompt()),
            ChatMessage::user(prompts::classification_user_prompt(email)),
        ])
        .with_temperature(CLASSIFY_TEMPERATURE)
        .with_max_tokens(CLASSIFY_MAX_TOKENS);

        let raw = match self.llm.complete(request).await {
            Ok(response) => response.content,
            Err(e) => {
                warn!(
                    email_id = %email.id,
                    error = %e,
                    "Classification call failed, defaulting to other"
                );
                return Ok(Classification {
                    category: Category::Other,
                    defaulted: true,
                    raw: None,
                });
            }
        };

        debug!(email_id = %email.id, raw = %raw, "Raw classifier output");

        match parse_category(&raw) {
            Some(category) => {
                info!(email_id = %email.id, category = %category, "Email classified");
                Ok(Classification {
                    category,
                    defaulted: false,
                    raw: Some(raw),
                })
            }
            None => {
                warn!(
                    email_id = %email.id,
                    raw = %raw,
                    "Unrecognized classification, defaulting to other"
                );
                Ok(Classification {
                    category: Category::Other,
                    defaulted: true,
                    raw: Some(raw),
                })
            }
        }
    }
}

/// Parse model output into a category.
///
/// Accepts a JSON object (optionally fenced or embedded in prose) with a
/// `category` or `classification` key in any case, or a bare label.
pub fn parse_category(raw: &str) -> Option<Category> {
    let unfenced = CODE_FENCE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .unwrap_or(raw)
        .trim();

    if let Some(category) = Category::from_label(unfenced) {
        return Some(category);
    }

    let value = first_json_value(unfenced)?;
    let map = value.as_object()?;

    let label = map.iter().find_map(|(key, value)| {
        let key = key.to_lowercase();
        if LABEL_KEYS.contains(&key.as_str()) {
            value.as_str()
        } else {
            None
        }
    })?;

    Category::from_label(label)
}

/// Parse the first JSON value starting at the first `{`, ignoring anything
/// that follows it.
fn first_json_value(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    serde_json::Deserializer::from_str(&text[start..])
        .into_iter::<Value>()
        .next()?
        .ok()
}
