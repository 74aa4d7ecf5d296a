//! Channel error types.

/// Errors surfaced by chat transports.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// The HTTP request to the chat platform failed.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The platform answered but rejected the call.
    #[error("{platform} API error (code {code}): {description}")]
    Api {
        platform: &'static str,
        code: i64,
        description: String,
    },

    /// The address cannot be delivered to by this channel.
    #[error("address not routable on channel `{channel}`: {reason}")]
    Unroutable { channel: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Convenience alias used throughout the channels crate.
pub type Result<T> = std::result::Result<T, ChannelError>;
