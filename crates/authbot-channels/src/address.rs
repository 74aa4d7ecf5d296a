//! Conversation addresses.
//!
//! A [`ConversationAddress`] is everything a channel needs to deliver a
//! message back into one conversation. The bot treats it as opaque: it is
//! serialized into the sign-in link, carried through the identity provider
//! as the OAuth `state`, and parsed back in the callback. Unknown fields
//! land in `extra` so an address written by a newer channel still
//! round-trips unchanged.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Route back to a single conversation with a single user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationAddress {
    /// Channel that owns the conversation, e.g. `telegram`.
    pub channel_id: String,
    /// Channel-specific conversation (chat) id.
    pub conversation_id: String,
    /// Channel-specific id of the user talking to the bot.
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_name: Option<String>,
    /// Endpoint of the channel connector, for channels that have one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Why a serialized address was rejected.
#[derive(Debug, thiserror::Error)]
pub enum AddressError {
    #[error("address is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("address field `{0}` is empty")]
    EmptyField(&'static str),
}

impl ConversationAddress {
    pub fn new(
        channel_id: impl Into<String>,
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            channel_id: channel_id.into(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            user_name: None,
            service_url: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Storage key for per-conversation state: `channel:conversation:user`.
    pub fn conversation_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.channel_id, self.conversation_id, self.user_id
        )
    }

    /// Serialize for embedding in a sign-in link and the OAuth `state`.
    pub fn to_state(&self) -> Result<String, AddressError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse an address produced by [`ConversationAddress::to_state`].
    pub fn from_state(raw: &str) -> Result<Self, AddressError> {
        let address: Self = serde_json::from_str(raw)?;
        for (name, value) in [
            ("channel_id", &address.channel_id),
            ("conversation_id", &address.conversation_id),
            ("user_id", &address.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(AddressError::EmptyField(name));
            }
        }
        Ok(address)
    }
}

// ── tests ────────────────────────────────────────────────────────────
