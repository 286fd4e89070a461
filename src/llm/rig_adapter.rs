//! Bridges rig-core's `CompletionModel` to our `LlmProvider` trait.

use async_trait::async_trait;
use rig::completion::{AssistantContent, CompletionModel, Message};

use crate::error::LlmError;
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role,
};

/// Adapter wrapping any rig completion model.
pub struct RigAdapter<M> {
    model: M,
    model_name: String,
    provider: &'static str,
}

impl<M> RigAdapter<M> {
    pub fn new(model: M, model_name: &str, provider: &'static str) -> Self {
        Self {
            model,
            model_name: model_name.to_string(),
            provider,
        }
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
        let preamble = request.system_prompt();

        let mut history: Vec<Message> = request
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| match m.role {
                Role::Assistant => Message::assistant(m.content.clone()),
                _ => Message::user(m.content.clone()),
            })
            .collect();

        let Some(prompt) = history.pop() else {
            return Err(LlmError::RequestFailed {
                provider: self.provider.to_string(),
                reason: "completion request has no user message".to_string(),
            });
        };

        let mut builder = self.model.completion_request(prompt).messages(history);
        if let Some(preamble) = preamble {
            builder = builder.preamble(preamble);
        }
        if let Some(temperature) = request.temperature {
            builder = builder.temperature(temperature);
        }
        if let Some(max_tokens) = request.max_tokens {
            builder = builder.max_tokens(u64::from(max_tokens));
        }

        let response = builder
            .send()
            .await
            .map_err(|e| classify_error(self.provider, &e.to_string()))?;

        let content: String = response
            .choice
            .iter()
            .filter_map(|c| match c {
                AssistantContent::Text(text) => Some(text.text.clone()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        let output_tokens = saturating_u32(response.usage.output_tokens);
        Ok(CompletionResponse {
            content,
            input_tokens: saturating_u32(response.usage.input_tokens),
            output_tokens,
            finish_reason: FinishReason::from_usage(output_tokens, request.max_tokens),
        })
    }
}

fn saturating_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Map a rig error message onto our error kinds.
///
/// rig flattens HTTP failures into strings, so the status is recovered
/// from the message text.
fn classify_error(provider: &str, message: &str) -> LlmError {
    let lower = message.to_lowercase();
    if lower.contains("429") || lower.contains("rate limit") || lower.contains("rate_limit") {
        LlmError::RateLimited {
            provider: provider.to_string(),
        }
    } else if lower.contains("401") || lower.contains("authentication") || lower.contains("api key")
    {
        LlmError::AuthFailed {
            provider: provider.to_string(),
        }
    } else if lower.contains("timed out") || lower.contains("timeout") {
        LlmError::Timeout {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    } else if lower.contains("json") || lower.contains("deserializ") {
        LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    } else {
        LlmError::RequestFailed {
            provider: provider.to_string(),
            reason: message.to_string(),
        }
    }
}
