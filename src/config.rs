//! Configuration for Lazarillo.
//!
//! All values come from environment variables (a `.env` file is honored via
//! `dotenvy` at startup), with serde defaults so a partially configured
//! process still boots. Provider API keys are the only secrets; everything
//! else has a sane default.

use serde::{Deserialize, Serialize};

use crate::error::{LazarilloError, Result};

/// Main configuration struct for Lazarillo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Relay server configuration.
    pub gateway: GatewayConfig,
    /// Gemini provider configuration.
    pub gemini: ProviderConfig,
    /// Groq provider configuration.
    pub groq: ProviderConfig,
    /// Provider used when a request does not name one ("gemini" or "groq").
    pub default_provider: String,
    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Relay server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
        }
    }
}

/// Per-provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API key; an empty key fails at request time, before any network call.
    pub api_key: String,
    /// Model override; the adapter default is used when unset.
    pub model: Option<String>,
    /// Per-attempt timeout budget in milliseconds.
    pub timeout_ms: u64,
    /// Fixed max-output-token budget; the policy mode decides when unset.
    pub max_output_tokens: Option<u32>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: None,
            timeout_ms: 25_000,
            max_output_tokens: None,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|s| s.parse().ok())
}

impl Config {
    /// Build the configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Config {
            default_provider: "gemini".to_string(),
            ..Config::default()
        };

        if let Some(host) = env_string("LAZARILLO_HOST") {
            config.gateway.host = host;
        }
        if let Some(port) = env_parse("PORT") {
            config.gateway.port = port;
        }
        if let Some(provider) = env_string("LAZARILLO_PROVIDER") {
            config.default_provider = provider.to_lowercase();
        }
        if let Some(level) = env_string("LAZARILLO_LOG_LEVEL") {
            config.logging.level = level;
        }

        config.gemini.api_key = env_string("GEMINI_API_KEY").unwrap_or_default();
        config.gemini.model = env_string("GEMINI_MODEL");
        if let Some(timeout) = env_parse("GEMINI_TIMEOUT_MS") {
            config.gemini.timeout_ms = timeout;
        }

        // LLAMA_API_KEY is accepted as a legacy alias.
        config.groq.api_key = env_string("GROQ_API_KEY")
            .or_else(|| env_string("LLAMA_API_KEY"))
            .unwrap_or_default();
        config.groq.model = env_string("GROQ_MODEL");
        if let Some(timeout) = env_parse("GROQ_TIMEOUT_MS") {
            config.groq.timeout_ms = timeout;
        }
        config.groq.max_output_tokens = env_parse("GROQ_MAX_TOKENS");

        config.validate()?;
        Ok(config)
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if !matches!(self.default_provider.as_str(), "gemini" | "groq") {
            return Err(LazarilloError::Config(format!(
                "unknown default provider: {}",
                self.default_provider
            )));
        }
        if self.gateway.port == 0 {
            return Err(LazarilloError::Config("gateway port must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.gateway.port, 3000);
        assert_eq!(config.gemini.timeout_ms, 25_000);
        assert!(config.gemini.api_key.is_empty());
        assert!(config.groq.max_output_tokens.is_none());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_validate_rejects_unknown_provider() {
        let config = Config {
            default_provider: "openai".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(LazarilloError::Config(_))
        ));
    }

    #[test]
    fn test_validate_accepts_known_providers() {
        for provider in ["gemini", "groq"] {
            let config = Config {
                default_provider: provider.to_string(),
                ..Config::default()
            };
            assert!(config.validate().is_ok());
        }
    }

    #[test]
    fn test_partial_json_config_uses_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"gateway": {"port": 8080}}"#).unwrap();
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.gateway.host, "0.0.0.0");
        assert_eq!(config.groq.timeout_ms, 25_000);
    }
}
