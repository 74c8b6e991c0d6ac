//! Typed errors for the aggregation library.
//!
//! Uses `thiserror` for library errors (not `anyhow`) so callers can
//! match on failure kinds and decide retry behavior.

use thiserror::Error;

use crate::types::platform::PlatformKey;

/// Errors that can occur across the platform aggregation core.
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Unknown platform key or resource id
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials rejected by the platform; never retried
    #[error("auth rejected by {platform}: {message}")]
    Auth {
        platform: PlatformKey,
        message: String,
    },

    /// Timeout, DNS, or 5xx failure; retryable with bounded backoff
    #[error("transport failure on {platform}: {message}")]
    Transport {
        platform: PlatformKey,
        message: String,
    },

    /// A scraping selector matched nothing; the page layout changed.
    /// Not retryable, signals maintenance is needed.
    #[error("unexpected page shape on {platform}: selector {selector:?} matched nothing")]
    DataShape {
        platform: PlatformKey,
        selector: String,
    },

    /// Every identity in the platform's rotation pool is in cooldown
    #[error("identity pool exhausted for {0}")]
    Exhausted(PlatformKey),

    /// Raw payload is missing a required canonical field
    #[error("normalization failed for {platform}: missing {field}")]
    Normalization {
        platform: PlatformKey,
        field: String,
    },

    /// Configuration invalid at load time
    #[error("config error: {0}")]
    Config(String),

    /// External key-value store failure
    #[error("cache error: {0}")]
    Cache(String),
}

impl PlatformError {
    /// Whether a caller may retry the failed operation after a delay.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::Transport { .. } | PlatformError::Exhausted(_)
        )
    }
}

/// Result type alias for aggregation operations.
pub type Result<T> = std::result::Result<T, PlatformError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let transport = PlatformError::Transport {
            platform: PlatformKey::from("stubhub"),
            message: "timeout".into(),
        };
        let auth = PlatformError::Auth {
            platform: PlatformKey::from("stubhub"),
            message: "401".into(),
        };
        let exhausted = PlatformError::Exhausted(PlatformKey::from("seatgeek"));

        assert!(transport.is_retryable());
        assert!(exhausted.is_retryable());
        assert!(!auth.is_retryable());
    }
}
