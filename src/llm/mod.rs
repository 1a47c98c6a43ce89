//! LLM integration for Switchboard.
//!
//! The language capability sits behind the `LlmProvider` trait. The bundled
//! backend speaks the OpenAI chat-completions protocol, which also covers
//! compatible gateways via a custom base URL.

pub mod openai;
pub mod provider;
pub mod reasoning;

pub use openai::OpenAiProvider;
pub use provider::*;
pub use reasoning::{Reasoning, ReasoningContext, RespondOutput, TokenUsage, WorkerOutcome};

use std::sync::Arc;

use crate::error::{ConfigError, LlmError};

/// Default OpenAI API base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
    pub base_url: String,
}

impl LlmConfig {
    /// Default chat model.
    pub const DEFAULT_MODEL: &'static str = "gpt-4o-2024-08-06";

    /// Read `OPENAI_API_KEY` (required), `OPENAI_MODEL` and `OPENAI_BASE_URL`.
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("OPENAI_API_KEY".to_string()))?;

        Ok(Self {
            backend: LlmBackend::OpenAi,
            api_key: secrecy::SecretString::from(api_key),
            model: std::env::var("OPENAI_MODEL").unwrap_or_else(|_| Self::DEFAULT_MODEL.to_string()),
            base_url: std::env::var("OPENAI_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string()),
        })
    }
}

/// Create an LLM provider from configuration.
pub fn create_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::OpenAi => create_openai_provider(config),
    }
}

fn create_openai_provider(config: &LlmConfig) -> Result<Arc<dyn LlmProvider>, LlmError> {
    if config.model.trim().is_empty() {
        return Err(LlmError::RequestFailed {
            provider: "openai".to_string(),
            reason: "model name is empty".to_string(),
        });
    }
    tracing::info!("Using OpenAI-compatible backend (model: {})", config.model);
    Ok(Arc::new(OpenAiProvider::new(
        config.api_key.clone(),
        &config.model,
        &config.base_url,
    )))
}
