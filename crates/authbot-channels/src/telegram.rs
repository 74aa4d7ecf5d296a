//! Telegram Bot API channel.
//!
//! Outbound messages go through `sendMessage`; a sign-in prompt becomes an
//! inline keyboard with a single URL button. Inbound messages are pulled
//! with long-polling `getUpdates`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::address::ConversationAddress;
use crate::error::{ChannelError, Result};
use crate::traits::{ChatChannel, InboundMessage, Outgoing};

/// Telegram Bot API base URL. Methods are POSTed to `{base}{token}/{method}`.
const TELEGRAM_API_BASE: &str = "https://api.telegram.org/bot";

/// Channel id used in [`ConversationAddress::channel_id`].
pub const TELEGRAM_CHANNEL_ID: &str = "telegram";

/// A batch of inbound messages and the offset to poll from next.
#[derive(Debug, Default)]
pub struct UpdateBatch {
    pub messages: Vec<InboundMessage>,
    /// `update_id + 1` of the last update seen, if any arrived.
    pub next_offset: Option<i64>,
}

/// Telegram Bot API client implementing [`ChatChannel`].
pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    http: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self::with_api_base(TELEGRAM_API_BASE, bot_token)
    }

    /// Point the client at a different API host (a local mock in tests).
    pub fn with_api_base(api_base: impl Into<String>, bot_token: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("authbot/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self {
            api_base: api_base.into(),
            bot_token: bot_token.into(),
            http,
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}{}/{}", self.api_base, self.bot_token, method)
    }

    /// Check the `ok` flag of a Bot API response and return its `result`.
    ///
    /// Responses look like `{ "ok": true, "result": ... }` or
    /// `{ "ok": false, "error_code": 400, "description": "..." }`.
    pub fn parse_response(response: Value) -> Result<Value> {
        let ok = response
            .get("ok")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !ok {
            return Err(ChannelError::Api {
                platform: "Telegram",
                code: response
                    .get("error_code")
                    .and_then(Value::as_i64)
                    .unwrap_or(-1),
                description: response
                    .get("description")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn call(&self, method: &str, body: &Value) -> Result<Value> {
        let response: Value = self
            .http
            .post(self.api_url(method))
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        Self::parse_response(response)
    }

    /// Confirm the token with `getMe` and return the bot's username.
    pub async fn get_me(&self) -> Result<String> {
        let me = self.call("getMe", &json!({})).await?;
        Ok(me
            .get("username")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string())
    }

    /// Long-poll for new messages starting at `offset`.
    pub async fn poll_updates(&self, offset: i64, timeout_secs: u64) -> Result<UpdateBatch> {
        let result = self
            .call(
                "getUpdates",
                &json!({
                    "offset": offset,
                    "timeout": timeout_secs,
                    "allowed_updates": ["message"],
                }),
            )
            .await?;

        let mut batch = UpdateBatch::default();
        for update in result.as_array().into_iter().flatten() {
            if let Some(update_id) = update.get("update_id").and_then(Value::as_i64) {
                batch.next_offset = Some(update_id + 1);
            }
            match update.get("message").and_then(inbound_from_message) {
                Some(message) => batch.messages.push(message),
                None => debug!("skipping non-text Telegram update"),
            }
        }
        Ok(batch)
    }

    fn send_body(address: &ConversationAddress, message: &Outgoing) -> Value {
        match message {
            Outgoing::Text { text } => json!({
                "chat_id": address.conversation_id,
                "text": text,
            }),
            Outgoing::SignIn { text, button, url } => json!({
                "chat_id": address.conversation_id,
                "text": text,
                "reply_markup": {
                    "inline_keyboard": [[{ "text": button, "url": url }]],
                },
            }),
        }
    }
}

/// Build an [`InboundMessage`] from a Telegram `message` object.
///
/// Returns `None` for messages without text or without a sender.
pub fn inbound_from_message(message: &Value) -> Option<InboundMessage> {
    let text = message.get("text")?.as_str()?;
    let chat = message.get("chat")?;
    let chat_id = chat.get("id")?.as_i64()?;
    let from = message.get("from")?;
    let user_id = from.get("id")?.as_i64()?;

    let mut address =
        ConversationAddress::new(TELEGRAM_CHANNEL_ID, chat_id.to_string(), user_id.to_string());
    address.user_name = from
        .get("first_name")
        .or_else(|| from.get("username"))
        .and_then(Value::as_str)
        .map(String::from);
    if let Some(kind) = chat.get("type") {
        address.extra.insert("chat_type".into(), kind.clone());
    }

    Some(InboundMessage {
        address,
        text: text.to_string(),
    })
}

#[async_trait]
impl ChatChannel for TelegramChannel {
    fn id(&self) -> &str {
        TELEGRAM_CHANNEL_ID
    }

    async fn send(&self, address: &ConversationAddress, message: Outgoing) -> Result<()> {
        if address.channel_id != TELEGRAM_CHANNEL_ID {
            return Err(ChannelError::Unroutable {
                channel: TELEGRAM_CHANNEL_ID.into(),
                reason: format!("address belongs to `{}`", address.channel_id),
            });
        }
        if address.conversation_id.parse::<i64>().is_err() {
            return Err(ChannelError::Unroutable {
                channel: TELEGRAM_CHANNEL_ID.into(),
                reason: "conversation id is not a Telegram chat id".into(),
            });
        }

        let body = Self::send_body(address, &message);
        debug!(conversation = %address.conversation_key(), "sending Telegram message");
        if let Err(e) = self.call("sendMessage", &body).await {
            warn!(conversation = %address.conversation_key(), error = %e, "Telegram sendMessage failed");
            return Err(e);
        }
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn address() -> ConversationAddress {
        ConversationAddress::new(TELEGRAM_CHANNEL_ID, "12345", "678")
    }

    #[test]
    fn api_url_embeds_token_and_method() {
        let channel = TelegramChannel::with_api_base("http://mock/bot", "123:ABC");
        assert_eq!(channel.api_url("sendMessage"), "http://mock/bot123:ABC/sendMessage");
    }

    #[test]
    fn parse_response_returns_result() {
        let result = TelegramChannel::parse_response(json!({"ok": true, "result": {"id": 1}}));
        assert_eq!(result.unwrap()["id"], 1);
    }

    #[test]
    fn parse_response_surfaces_api_error() {
        let err = TelegramChannel::parse_response(
            json!({"ok": false, "error_code": 403, "description": "bot was blocked"}),
        )
        .unwrap_err();
        assert!(matches!(err, ChannelError::Api { code: 403, .. }));
    }

    #[test]
    fn parse_response_without_ok_is_error() {
        assert!(TelegramChannel::parse_response(json!({"result": []})).is_err());
    }

    #[test]
    fn sign_in_becomes_inline_url_button() {
        let body = TelegramChannel::send_body(
            &address(),
            &Outgoing::SignIn {
                text: "Please sign in".into(),
                button: "Sign in".into(),
                url: "https://bot.example/login?address=x".into(),
            },
        );
        assert_eq!(body["chat_id"], "12345");
        let button = &body["reply_markup"]["inline_keyboard"][0][0];
        assert_eq!(button["text"], "Sign in");
        assert_eq!(button["url"], "https://bot.example/login?address=x");
    }

    #[test]
    fn text_has_no_markup() {
        let body = TelegramChannel::send_body(&address(), &Outgoing::text("hi"));
        assert!(body.get("reply_markup").is_none());
    }

    #[test]
    fn inbound_message_builds_address() {
        let message = json!({
            "message_id": 1,
            "from": {"id": 678, "first_name": "Ada", "username": "ada_l"},
            "chat": {"id": 12345, "type": "private"},
            "text": "hello"
        });
        let inbound = inbound_from_message(&message).unwrap();
        assert_eq!(inbound.text, "hello");
        assert_eq!(inbound.address.conversation_key(), "telegram:12345:678");
        assert_eq!(inbound.address.user_name.as_deref(), Some("Ada"));
        assert_eq!(inbound.address.extra["chat_type"], "private");
    }

    #[test]
    fn inbound_without_text_is_skipped() {
        let message = json!({
            "from": {"id": 1},
            "chat": {"id": 2, "type": "private"},
            "sticker": {}
        });
        assert!(inbound_from_message(&message).is_none());
    }

    #[tokio::test]
    async fn send_rejects_foreign_address() {
        let channel = TelegramChannel::with_api_base("http://127.0.0.1:1/bot", "t");
        let foreign = ConversationAddress::new("msteams", "19:abc", "u");
        let err = channel.send(&foreign, Outgoing::text("x")).await.unwrap_err();
        assert!(matches!(err, ChannelError::Unroutable { .. }));
    }
}
