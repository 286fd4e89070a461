//! Configuration types.
//!
//! Everything is read from environment variables once at startup and then
//! passed explicitly to constructors.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig, RetryPolicy};

/// Default sampling temperature for every stage.
pub const DEFAULT_TEMPERATURE: f64 = 0.3;

/// Default completion budget per stage.
pub const DEFAULT_MAX_TOKENS: u32 = 512;

/// Default interaction log location.
pub const DEFAULT_LOG_PATH: &str = "./data/logs/reply_log.jsonl";

/// Settings consumed by the pipeline engine.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Temperature applied verbatim to every stage request.
    pub temperature: f64,
    /// Max tokens per stage response.
    pub max_tokens: u32,
    /// Backoff schedule around each model call.
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
            retry: RetryPolicy::default(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub log_path: PathBuf,
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match lookup("REPLY_ASSIST_BACKEND") {
            Some(name) => LlmBackend::parse(&name).ok_or_else(|| ConfigError::InvalidValue {
                key: "REPLY_ASSIST_BACKEND".to_string(),
                message: format!("unknown backend '{name}' (expected anthropic or openai)"),
            })?,
            None => LlmBackend::OpenAi,
        };

        let key_var = backend.api_key_var();
        let api_key = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar(key_var.to_string()))?;

        let model = lookup("REPLY_ASSIST_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| backend.default_model().to_string());

        let temperature: f64 =
            parse_var(&lookup, "REPLY_ASSIST_TEMPERATURE", DEFAULT_TEMPERATURE)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "REPLY_ASSIST_TEMPERATURE".to_string(),
                message: format!("{temperature} is outside 0.0..=2.0"),
            });
        }

        let max_tokens: u32 = parse_var(&lookup, "REPLY_ASSIST_MAX_TOKENS", DEFAULT_MAX_TOKENS)?;

        let defaults = RetryPolicy::default();
        let max_retries: u32 =
            parse_var(&lookup, "REPLY_ASSIST_MAX_RETRIES", defaults.max_retries)?;
        let base_ms: u64 = parse_var(
            &lookup,
            "REPLY_ASSIST_RETRY_BASE_MS",
            defaults.base_delay.as_millis() as u64,
        )?;
        let max_ms: u64 = parse_var(
            &lookup,
            "REPLY_ASSIST_RETRY_MAX_MS",
            defaults.max_delay.as_millis() as u64,
        )?;
        if max_ms < base_ms {
            return Err(ConfigError::InvalidValue {
                key: "REPLY_ASSIST_RETRY_MAX_MS".to_string(),
                message: format!("{max_ms} is smaller than the base delay {base_ms}"),
            });
        }
        let jitter = match lookup("REPLY_ASSIST_RETRY_JITTER") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "REPLY_ASSIST_RETRY_JITTER".to_string(),
                message: format!("'{raw}' is not a boolean"),
            })?,
            None => defaults.jitter,
        };

        Ok(Self {
            llm: LlmConfig {
                backend,
                api_key: secrecy::SecretString::from(api_key),
                model,
            },
            pipeline: PipelineConfig {
                temperature,
                max_tokens,
                retry: RetryPolicy {
                    max_retries,
                    base_delay: Duration::from_millis(base_ms),
                    max_delay: Duration::from_millis(max_ms),
                    jitter,
                    ..defaults
                },
            },
            log_path: log_path_from(&lookup),
        })
    }
}

/// Interaction log path, without requiring model credentials.
pub fn log_path_from_env() -> PathBuf {
    log_path_from(&|key: &str| std::env::var(key).ok())
}

fn log_path_from<F>(lookup: &F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    lookup("REPLY_ASSIST_LOG_PATH")
        .filter(|p| !p.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_PATH))
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
        None => Ok(default),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
