//! Configuration from the process environment.
//!
//! Two credentials are required; everything else has a default. A missing or
//! malformed variable is fatal at startup and is reported to the operator,
//! never to chat users.

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    MissingVar(&'static str),
    #[error("invalid value for {name}: {reason}")]
    InvalidVar { name: &'static str, reason: String },
    #[error("TELEGRAM_BOT_TOKEN appears invalid (expected format: 123456789:ABCdefGHI...)")]
    InvalidToken,
}

pub struct Config {
    pub telegram_bot_token: String,
    pub gemini_api_key: String,
    /// Gemini model name, e.g. "gemini-2.5-flash".
    pub gemini_model: String,
    /// Max stored turns per chat; oldest evicted first.
    pub history_cap: usize,
    /// Max chars per outgoing Telegram message.
    pub chunk_limit: usize,
    /// Timeout applied to the Gemini HTTP client.
    pub request_timeout: Duration,
}

const DEFAULT_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_HISTORY_CAP: usize = 20;
const DEFAULT_CHUNK_LIMIT: usize = 4000;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from a variable lookup. Tests feed maps through this
    /// instead of mutating the real environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let telegram_bot_token = required(&lookup, "TELEGRAM_BOT_TOKEN")?;
        let gemini_api_key = required(&lookup, "GEMINI_API_KEY")?;

        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        let token_parts: Vec<&str> = telegram_bot_token.split(':').collect();
        if token_parts.len() != 2
            || token_parts[0].parse::<u64>().is_err()
            || token_parts[1].is_empty()
        {
            return Err(ConfigError::InvalidToken);
        }

        let gemini_model = lookup("GEMINI_MODEL")
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let history_cap = numeric(&lookup, "HISTORY_CAP", DEFAULT_HISTORY_CAP)?;
        let chunk_limit = numeric(&lookup, "CHUNK_LIMIT", DEFAULT_CHUNK_LIMIT)?;
        let timeout_secs = numeric(&lookup, "REQUEST_TIMEOUT_SECS", DEFAULT_TIMEOUT_SECS)?;

        Ok(Self {
            telegram_bot_token,
            gemini_api_key,
            gemini_model,
            history_cap,
            chunk_limit,
            request_timeout: Duration::from_secs(timeout_secs),
        })
    }
}

fn required(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    match lookup(name) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(ConfigError::MissingVar(name)),
    }
}

fn numeric<T: std::str::FromStr + PartialEq + Default>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    let value: T = raw.trim().parse().map_err(|_| ConfigError::InvalidVar {
        name,
        reason: format!("'{}' is not a valid number", raw),
    })?;
    if value == T::default() {
        // Zero caps/limits/timeouts would wedge the bot.
        return Err(ConfigError::InvalidVar {
            name,
            reason: "must be greater than zero".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    fn assert_err(result: Result<Config, ConfigError>) -> ConfigError {
        match result {
            Ok(_) => panic!("expected error, got Ok"),
            Err(e) => e,
        }
    }

    #[test]
    fn test_valid_config_with_defaults() {
        let config = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:ABCdefGHIjklMNOpqrsTUVwxyz"),
            ("GEMINI_API_KEY", "test-key"),
        ]))
        .expect("should load valid config");

        assert_eq!(config.gemini_model, "gemini-2.5-flash");
        assert_eq!(config.history_cap, 20);
        assert_eq!(config.chunk_limit, 4000);
        assert_eq!(config.request_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:ABCdef"),
            ("GEMINI_API_KEY", "test-key"),
            ("GEMINI_MODEL", "gemini-2.5-pro"),
            ("HISTORY_CAP", "6"),
            ("CHUNK_LIMIT", "500"),
            ("REQUEST_TIMEOUT_SECS", "30"),
        ]))
        .expect("should load");

        assert_eq!(config.gemini_model, "gemini-2.5-pro");
        assert_eq!(config.history_cap, 6);
        assert_eq!(config.chunk_limit, 500);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_bot_token() {
        let err = assert_err(Config::from_lookup(lookup_from(&[(
            "GEMINI_API_KEY",
            "test-key",
        )])));
        assert!(matches!(err, ConfigError::MissingVar("TELEGRAM_BOT_TOKEN")));
    }

    #[test]
    fn test_missing_api_key() {
        let err = assert_err(Config::from_lookup(lookup_from(&[(
            "TELEGRAM_BOT_TOKEN",
            "123456789:ABCdef",
        )])));
        assert!(matches!(err, ConfigError::MissingVar("GEMINI_API_KEY")));
    }

    #[test]
    fn test_empty_api_key_counts_as_missing() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:ABCdef"),
            ("GEMINI_API_KEY", "  "),
        ])));
        assert!(matches!(err, ConfigError::MissingVar("GEMINI_API_KEY")));
    }

    #[test]
    fn test_invalid_token_format_no_colon() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "invalid_token_no_colon"),
            ("GEMINI_API_KEY", "test-key"),
        ])));
        assert!(matches!(err, ConfigError::InvalidToken));
    }

    #[test]
    fn test_invalid_token_format_non_numeric_id() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "notanumber:ABCdef"),
            ("GEMINI_API_KEY", "test-key"),
        ])));
        assert!(matches!(err, ConfigError::InvalidToken));
    }

    #[test]
    fn test_invalid_token_format_empty_secret() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:"),
            ("GEMINI_API_KEY", "test-key"),
        ])));
        assert!(matches!(err, ConfigError::InvalidToken));
    }

    #[test]
    fn test_non_numeric_override() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:ABCdef"),
            ("GEMINI_API_KEY", "test-key"),
            ("HISTORY_CAP", "lots"),
        ])));
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "HISTORY_CAP",
                ..
            }
        ));
    }

    #[test]
    fn test_zero_override_rejected() {
        let err = assert_err(Config::from_lookup(lookup_from(&[
            ("TELEGRAM_BOT_TOKEN", "123456789:ABCdef"),
            ("GEMINI_API_KEY", "test-key"),
            ("CHUNK_LIMIT", "0"),
        ])));
        assert!(matches!(
            err,
            ConfigError::InvalidVar {
                name: "CHUNK_LIMIT",
                ..
            }
        ));
    }
}
