//! Runtime error taxonomy for the relay.
//!
//! Config problems are a separate startup-only type ([`crate::config::ConfigError`]);
//! everything that can happen while handling an update is a `RelayError`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    /// Unsupported or corrupt image payload. Never forwarded upstream.
    #[error("unsupported image: {0}")]
    Media(String),
    /// The Gemini call or a Telegram API call failed or timed out.
    #[error("upstream call failed: {0}")]
    Upstream(String),
    /// Anything unexpected caught at the handler boundary.
    #[error("internal error: {0}")]
    Internal(String),
}
