//! Error types for the login flow and configuration.

use authbot_auth_engine::AuthEngineError;
use authbot_channels::ChannelError;
use authbot_store::StoreError;

/// Failures of the sign-in handshake.
///
/// The first five variants are outcomes the user can recover from; the
/// rest are infrastructure faults.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    /// The identity provider rejected the sign-in or returned no identity.
    #[error("authentication failed: {reason}")]
    Authentication { reason: String },

    /// The `state` carried through the provider is missing or malformed.
    #[error("invalid sign-in state: {reason}")]
    InvalidState { reason: String },

    /// A refresh token could not be exchanged.
    #[error("token refresh failed: {0}")]
    Refresh(#[source] AuthEngineError),

    /// The typed code belongs to another conversation.
    #[error("magic code does not belong to this conversation")]
    CodeMismatch,

    /// The typed code was never issued, already used, or has expired.
    #[error("magic code expired or already used")]
    CodeExpiredOrConsumed,

    /// No unused magic code could be drawn.
    #[error("no free magic code after {attempts} attempts")]
    CodeSpaceExhausted { attempts: u32 },

    /// The system random source failed.
    #[error("secure random generator unavailable")]
    Random,

    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

/// Convenience alias for login operations.
pub type LoginResult<T> = std::result::Result<T, LoginError>;

/// Problems assembling [`crate::config::AuthBotConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required setting `{var}`")]
    Missing { var: &'static str },

    #[error("invalid value for `{var}`: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("cannot read config file {path}: {reason}")]
    File { path: String, reason: String },
}
