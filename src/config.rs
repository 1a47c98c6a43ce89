//! Configuration types.
//!
//! Every struct has a `Default` and a `from_env()` constructor. Unset or
//! unparseable variables fall back to the defaults.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::guardrail::GuardrailConfig;

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum turns kept per session (oldest dropped first).
    pub max_turns: usize,
    /// Maximum tool invocations a worker may make in one cycle.
    pub max_tool_calls: usize,
    /// Maximum router→worker cycles per user turn.
    pub max_cycles: u32,
    /// Deadline for a whole user turn.
    pub request_timeout: Duration,
    /// Timeout for a single language-capability call.
    pub llm_timeout: Duration,
    /// Timeout for a single tool call.
    pub tool_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 50,
            max_tool_calls: 8,
            max_cycles: 10,
            request_timeout: Duration::from_secs(120),
            llm_timeout: Duration::from_secs(60),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

impl EngineConfig {
    /// Build config from `SWITCHBOARD_*` environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_turns: env_parse("SWITCHBOARD_MAX_TURNS").unwrap_or(defaults.max_turns),
            max_tool_calls: env_parse("SWITCHBOARD_MAX_TOOL_CALLS")
                .unwrap_or(defaults.max_tool_calls),
            max_cycles: env_parse("SWITCHBOARD_MAX_CYCLES").unwrap_or(defaults.max_cycles),
            request_timeout: env_parse("SWITCHBOARD_REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            llm_timeout: env_parse("SWITCHBOARD_LLM_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.llm_timeout),
            tool_timeout: env_parse("SWITCHBOARD_TOOL_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.tool_timeout),
        }
    }

    /// Reject values that would make the engine unusable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_turns == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_turns".into(),
                message: "must be at least 1".into(),
            });
        }
        if self.max_cycles == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_cycles".into(),
                message: "must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// HTTP server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("SWITCHBOARD_HOST").unwrap_or(defaults.host),
            port: env_parse("SWITCHBOARD_PORT").unwrap_or(defaults.port),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Naver open search API credentials.
#[derive(Debug, Clone)]
pub struct NaverConfig {
    pub client_id: String,
    pub client_secret: SecretString,
    pub base_url: String,
}

impl NaverConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://openapi.naver.com/v1/search";

    /// `None` unless both `NAVER_CLIENT_ID` and `NAVER_CLIENT_SECRET` are set.
    pub fn from_env() -> Option<Self> {
        let client_id = non_empty_env("NAVER_CLIENT_ID")?;
        let client_secret = non_empty_env("NAVER_CLIENT_SECRET")?;
        Some(Self {
            client_id,
            client_secret: SecretString::from(client_secret),
            base_url: std::env::var("NAVER_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Kakao calendar API credentials.
#[derive(Debug, Clone)]
pub struct KakaoConfig {
    pub access_token: SecretString,
    pub base_url: String,
}

impl KakaoConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://kapi.kakao.com/v2/api/calendar";

    /// `None` unless `KAKAO_ACCESS_TOKEN` is set.
    pub fn from_env() -> Option<Self> {
        let token = non_empty_env("KAKAO_ACCESS_TOKEN")?;
        Some(Self {
            access_token: SecretString::from(token),
            base_url: std::env::var("KAKAO_CALENDAR_BASE_URL")
                .unwrap_or_else(|_| Self::DEFAULT_BASE_URL.to_string()),
        })
    }
}

/// Outgoing SMTP settings for the mail worker.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
    /// Socket timeout for the SMTP conversation.
    pub timeout: Duration,
}

impl SmtpConfig {
    /// `None` unless `SMTP_HOST` is set.
    pub fn from_env() -> Option<Self> {
        let host = non_empty_env("SMTP_HOST")?;
        let port: u16 = env_parse("SMTP_PORT").unwrap_or(587);
        let username = std::env::var("SMTP_USERNAME").unwrap_or_default();
        let password = std::env::var("SMTP_PASSWORD").unwrap_or_default();
        let from_address = std::env::var("SMTP_FROM_ADDRESS").unwrap_or_else(|_| username.clone());

        Some(Self {
            host,
            port,
            username,
            password: SecretString::from(password),
            from_address,
            timeout: env_parse("SMTP_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(Duration::from_secs(15)),
        })
    }
}

/// Load guardrail tables from `SWITCHBOARD_GUARDRAIL_FILE`, or use the
/// built-in defaults when it is not set.
pub fn guardrail_from_env() -> Result<GuardrailConfig, ConfigError> {
    match std::env::var("SWITCHBOARD_GUARDRAIL_FILE") {
        Ok(path) => GuardrailConfig::from_file(PathBuf::from(path)),
        Err(_) => Ok(GuardrailConfig::default()),
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::default();
        assert_eq!(config.max_turns, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_turn_cap_rejected() {
        let config = EngineConfig {
            max_turns: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn bind_addr_formats_host_and_port() {
        let server = ServerConfig {
            host: "127.0.0.1".into(),
            port: 9000,
        };
        assert_eq!(server.bind_addr(), "127.0.0.1:9000");
    }

    #[test]
    fn smtp_config_none_without_host() {
        // SAFETY: no other test reads SMTP_HOST.
        unsafe { std::env::remove_var("SMTP_HOST") };
        assert!(SmtpConfig::from_env().is_none());
    }
}
