//! Refresh token grant.
//!
//! [`TokenRefresher`] is the seam the chat dialog depends on. A refresh
//! failure means the stored sign-in is no longer usable; it is never retried
//! because a revoked or stale refresh token does not recover on its own.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AuthEngineError, Result};
use crate::oidc::OidcClient;

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshedTokens {
    /// The new access token.
    pub access_token: String,
    /// A rotated refresh token, when the provider issued one.
    pub refresh_token: Option<String>,
}

/// Exchanges a refresh token for a fresh access token.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Perform a single refresh exchange.
    ///
    /// # Errors
    ///
    /// Returns an error for an empty token, a provider rejection (including
    /// an `error` member in an HTTP 200 body), or a transport failure.
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens>;
}

#[async_trait]
impl TokenRefresher for OidcClient {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens> {
        if refresh_token.trim().is_empty() {
            return Err(AuthEngineError::InvalidGrant {
                reason: "empty refresh token".to_string(),
            });
        }

        let mut params = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
        ];
        if let Some(ref resource) = self.config.refresh_resource {
            params.push(("resource", resource.as_str()));
        }

        tracing::debug!(token_url = %self.endpoints.token_endpoint, "refreshing access token");

        let tokens = self.post_token_form(&params).await?;

        tracing::debug!(rotated = tokens.refresh_token.is_some(), "access token refreshed");

        Ok(RefreshedTokens {
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
