//! Error types for Reply Assist.

use std::path::PathBuf;

use crate::pipeline::state::Stage;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Log error: {0}")]
    Log(#[from] LogError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// LLM provider errors.
///
/// Every variant is treated as retryable by the call wrapper; once retries
/// are exhausted the pipeline absorbs it into a stage fallback.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Provider {provider} timed out: {reason}")]
    Timeout { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },
}

/// Errors reading an inbound email.
///
/// Content shape never produces an error; only the source can.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    #[error("Failed to read email from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Interaction log errors.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("Log destination {path} is not writable: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt log record at {path}:{line}: {source}")]
    Corrupt {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Why a pipeline stage could not use the model's output.
///
/// Never escapes the pipeline: each stage matches on it and substitutes
/// its fallback value.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{stage} call failed: {source}")]
    Call {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("{stage} returned empty output")]
    EmptyOutput { stage: Stage },

    #[error("{stage} returned malformed output: {reason}")]
    Malformed { stage: Stage, reason: String },
}

/// Result type alias for Reply Assist.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn load_config() -> Result<()> {
        let key: std::result::Result<String, ConfigError> =
            Err(ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()));
        key?;
        Ok(())
    }

    #[test]
    fn component_errors_convert_into_top_level() {
        let err = load_config().unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::MissingEnvVar(_))));
        assert_eq!(
            err.to_string(),
            "Configuration error: Missing required environment variable: OPENAI_API_KEY"
        );
    }

    #[test]
    fn stage_error_keeps_llm_source() {
        let err = StageError::Call {
            stage: Stage::Extract,
            source: LlmError::RateLimited {
                provider: "openai".to_string(),
            },
        };
        assert_eq!(err.to_string(), "extract call failed: Provider openai rate limited");
        assert!(std::error::Error::source(&err).is_some());
    }
}
