//! Error types for Switchboard.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Routing error: {0}")]
    Route(#[from] RouteError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Language capability errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Authentication failed for provider {provider}")]
    AuthFailed { provider: String },

    #[error("Provider {provider} rate limited")]
    RateLimited { provider: String },

    #[error("Provider call timed out after {0:?}")]
    Timeout(Duration),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Router protocol errors.
#[derive(Debug, thiserror::Error)]
pub enum RouteError {
    /// The capability answered with something outside the closed option set.
    #[error("Invalid route decision: {value:?}")]
    InvalidDecision { value: String },

    #[error("Routing capability unavailable: {0}")]
    Capability(#[from] LlmError),
}

/// Errors that end a worker's cycle.
///
/// Failed tool executions are not represented here; they are fed back into
/// the tool loop as text.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Worker {worker} requested unknown tool {tool}")]
    UnknownTool { worker: String, tool: String },

    #[error("Worker capability unavailable: {0}")]
    Capability(#[from] LlmError),
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_error_from_llm() {
        let err: RouteError = LlmError::Timeout(Duration::from_secs(1)).into();
        assert!(matches!(err, RouteError::Capability(LlmError::Timeout(_))));
    }

    #[test]
    fn unknown_tool_message_names_both_sides() {
        let err = WorkerError::UnknownTool {
            worker: "Calendar".to_string(),
            tool: "teleport".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("Calendar"));
        assert!(msg.contains("teleport"));
    }

    #[test]
    fn top_level_wraps_worker_error() {
        let err: Error = WorkerError::Capability(LlmError::AuthFailed {
            provider: "openai".to_string(),
        })
        .into();
        assert!(err.to_string().starts_with("Worker error"));
    }
}
