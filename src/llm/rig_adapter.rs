//! Bridges rig-core completion models to our `LlmProvider` trait.

use std::fmt::Display;
use std::future::IntoFuture;
use std::time::Duration;

use async_trait::async_trait;
use rig::agent::AgentBuilder;
use rig::completion::{CompletionModel, Prompt};

use crate::error::LlmError;
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};

/// Default bound on a single inference call.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Default output budget; Anthropic requires one on every request.
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Adapter wrapping any rig `CompletionModel`.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    timeout: Duration,
}

impl<M> RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    pub fn new(model: M, model_name: &str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl<M> LlmProvider for RigAdapter<M>
where
    M: CompletionModel + 'static,
{
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let mut builder = AgentBuilder::new(self.model.clone())
            .max_tokens(u64::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)));
        if let Some(system) = request.system_prompt() {
            builder = builder.preamble(&system);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(f64::from(temperature));
        }
        let agent = builder.build();

        let prompt = request.user_prompt();
        let content = bounded(&self.model_name, self.timeout, agent.prompt(prompt)).await?;

        tracing::debug!(model = %self.model_name, chars = content.len(), "LLM completion received");

        Ok(CompletionResponse { content })
    }
}

/// Await a provider call, failing with `LlmError::Timeout` once `timeout`
/// elapses. The in-flight request is dropped on timeout.
async fn bounded<F, E>(provider: &str, timeout: Duration, call: F) -> Result<String, LlmError>
where
    F: IntoFuture<Output = Result<String, E>>,
    E: Display,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| LlmError::Timeout {
            provider: provider.to_string(),
            timeout,
        })?
        .map_err(|e| LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: e.to_string(),
        })
}
