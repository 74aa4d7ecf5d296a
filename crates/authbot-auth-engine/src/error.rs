//! Error types for the auth engine crate.
//!
//! All auth engine operations surface errors through [`AuthEngineError`],
//! which is the single error type for this crate. Each variant carries enough
//! context for callers to decide how to handle the failure.

/// Unified error type for the AuthBot auth engine.
#[derive(Debug, thiserror::Error)]
pub enum AuthEngineError {
    /// The authorization code exchange or refresh grant was rejected by the
    /// identity provider.
    #[error("invalid grant: {reason}")]
    InvalidGrant {
        /// Explanation from the identity provider.
        reason: String,
    },

    /// An HTTP request to the identity provider failed.
    #[error("network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// Configuration is missing or malformed.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong with the configuration.
        reason: String,
    },

    /// The OpenID discovery document could not be used.
    #[error("discovery failed for {url}: {reason}")]
    Discovery {
        /// The discovery URL that was fetched.
        url: String,
        /// Why the document was rejected.
        reason: String,
    },

    /// The id token returned by the token endpoint is not a decodable JWT.
    #[error("invalid id token: {reason}")]
    InvalidIdToken {
        /// What is wrong with the token.
        reason: String,
    },

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// URL parsing error.
    #[error("url parse error: {0}")]
    UrlParse(#[from] url::ParseError),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, AuthEngineError>;

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_invalid_grant() {
        let err = AuthEngineError::InvalidGrant {
            reason: "bad code".to_string(),
        };
        assert_eq!(err.to_string(), "invalid grant: bad code");
    }

    #[test]
    fn error_display_discovery() {
        let err = AuthEngineError::Discovery {
            url: "https://idp.example.com/.well-known/openid-configuration".to_string(),
            reason: "missing token_endpoint".to_string(),
        };
        assert!(err.to_string().contains("missing token_endpoint"));
        assert!(err.to_string().contains("idp.example.com"));
    }

    #[test]
    fn error_display_invalid_config() {
        let err = AuthEngineError::InvalidConfig {
            reason: "missing client_id".to_string(),
        };
        assert_eq!(err.to_string(), "invalid configuration: missing client_id");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AuthEngineError>();
    }
}
