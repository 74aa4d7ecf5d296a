//! The chat transport interface.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::address::ConversationAddress;
use crate::error::Result;

/// A message the bot sends into a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outgoing {
    /// Plain text.
    Text { text: String },
    /// A prompt with a button that opens `url` in the user's browser.
    SignIn {
        text: String,
        button: String,
        url: String,
    },
}

impl Outgoing {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// The human-readable body, regardless of kind.
    pub fn body(&self) -> &str {
        match self {
            Self::Text { text } | Self::SignIn { text, .. } => text,
        }
    }
}

/// A user message received from a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub address: ConversationAddress,
    pub text: String,
}

/// A chat platform the bot can talk through.
#[async_trait]
pub trait ChatChannel: Send + Sync {
    /// Channel id, matching [`ConversationAddress::channel_id`].
    fn id(&self) -> &str;

    /// Deliver `message` to the conversation at `address`.
    async fn send(&self, address: &ConversationAddress, message: Outgoing) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_of_sign_in_is_its_text() {
        let msg = Outgoing::SignIn {
            text: "Please sign in".into(),
            button: "Sign in".into(),
            url: "https://bot.example/login".into(),
        };
        assert_eq!(msg.body(), "Please sign in");
        assert_eq!(Outgoing::text("hi").body(), "hi");
    }

    #[test]
    fn outgoing_is_tagged_by_kind() {
        let json = serde_json::to_value(Outgoing::text("hi")).unwrap();
        assert_eq!(json["kind"], "text");
    }
}
