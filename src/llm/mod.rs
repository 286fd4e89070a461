//! LLM integration for Reply Assist.
//!
//! Supports:
//! - **Anthropic**: Direct API access via rig-core
//! - **OpenAI**: Direct API access via rig-core
//!
//! Uses the rig-core crate for HTTP transport and the `RigAdapter` to bridge
//! rig's `CompletionModel` trait to our `LlmProvider` trait. Every pipeline
//! call goes through `retry::call_with_retry`.

pub mod provider;
pub mod retry;
mod rig_adapter;

pub use provider::*;
pub use retry::{RetryPolicy, call_with_retry};
pub use rig_adapter::RigAdapter;

use std::sync::Arc;

use rig::client::CompletionClient;
use secrecy::ExposeSecret;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Anthropic,
    OpenAi,
}

impl LlmBackend {
    /// Parse a backend name (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "anthropic" | "claude" => Some(Self::Anthropic),
            "openai" | "gpt" => Some(Self::OpenAi),
            _ => None,
        }
    }

    /// Environment variable holding the API key for this backend.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
        }
    }

    /// Model used when none is configured.
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => "claude-3-5-haiku-latest",
            Self::OpenAi => "gpt-4o-mini",
        }
    }

    /// Provider name carried in errors and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    let provider = match config.backend {
        LlmBackend::Anthropic => anthropic_adapter(config)?,
        LlmBackend::OpenAi => openai_adapter(config)?,
    };
    tracing::info!(
        backend = %config.backend,
        model = %config.model,
        "Reply model ready"
    );
    Ok(provider)
}

fn client_error(backend: LlmBackend, err: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: backend.name().to_string(),
        reason: format!("client setup failed: {err}"),
    }
}

fn anthropic_adapter(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::anthropic;

    let backend = LlmBackend::Anthropic;
    let client: rig::client::Client<anthropic::client::AnthropicExt> =
        anthropic::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(backend, e))?;
    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, backend.name())))
}

fn openai_adapter(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    use rig::providers::openai;

    let backend = LlmBackend::OpenAi;
    let client: rig::client::Client<openai::client::OpenAIResponsesExt> =
        openai::Client::new(config.api_key.expose_secret())
            .map_err(|e| client_error(backend, e))?;
    let model = client.completion_model(&config.model);
    Ok(Arc::new(RigAdapter::new(model, &config.model, backend.name())))
}
