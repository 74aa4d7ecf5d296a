//! Telegram channel against a local mock of the Bot API.

use std::sync::{Arc, Mutex};

use authbot_channels::{ChannelError, ChatChannel, ConversationAddress, Outgoing, TelegramChannel};
use axum::extract::{Json, Path, State};
use axum::routing::post;
use axum::Router;
use serde_json::{Value, json};

type Calls = Arc<Mutex<Vec<(String, Value)>>>;

async fn bot_api(
    State(calls): State<Calls>,
    Path((_token, method)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Json<Value> {
    calls.lock().unwrap().push((method.clone(), body.clone()));
    let reply = match method.as_str() {
        "sendMessage" if body["chat_id"] == "404" => {
            json!({"ok": false, "error_code": 400, "description": "Bad Request: chat not found"})
        }
        "sendMessage" => json!({"ok": true, "result": {"message_id": 1}}),
        "getMe" => json!({"ok": true, "result": {"id": 1, "username": "authbot_test"}}),
        "getUpdates" => json!({
            "ok": true,
            "result": [
                {
                    "update_id": 500,
                    "message": {
                        "message_id": 9,
                        "from": {"id": 7, "first_name": "Ada"},
                        "chat": {"id": 99, "type": "private"},
                        "text": "hello"
                    }
                },
                {
                    "update_id": 501,
                    "edited_message": {"text": "ignored"}
                }
            ]
        }),
        _ => json!({"ok": false, "error_code": 404, "description": "Not Found"}),
    };
    Json(reply)
}

async fn mock() -> (TelegramChannel, Calls) {
    let calls: Calls = Arc::default();
    let app = Router::new()
        .route("/{token}/{method}", post(bot_api))
        .with_state(Arc::clone(&calls));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    // The token is the path segment right after the base.
    let channel = TelegramChannel::with_api_base(format!("http://{addr}/"), "bot123");
    (channel, calls)
}

#[tokio::test]
async fn sends_sign_in_with_inline_button() {
    let (channel, calls) = mock().await;
    let address = ConversationAddress::new("telegram", "99", "7");

    channel
        .send(
            &address,
            Outgoing::SignIn {
                text: "Please sign in".into(),
                button: "Sign in".into(),
                url: "https://bot.example/login?address=%7B%7D".into(),
            },
        )
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    let (method, body) = &calls[0];
    assert_eq!(method, "sendMessage");
    assert_eq!(body["chat_id"], "99");
    assert_eq!(
        body["reply_markup"]["inline_keyboard"][0][0]["url"],
        "https://bot.example/login?address=%7B%7D"
    );
}

#[tokio::test]
async fn api_rejection_is_an_error() {
    let (channel, _calls) = mock().await;
    let address = ConversationAddress::new("telegram", "404", "7");

    let err = channel.send(&address, Outgoing::text("hi")).await.unwrap_err();
    assert!(matches!(err, ChannelError::Api { code: 400, .. }));
}

#[tokio::test]
async fn poll_collects_text_messages_and_advances_offset() {
    let (channel, calls) = mock().await;

    let batch = channel.poll_updates(42, 0).await.unwrap();
    assert_eq!(batch.next_offset, Some(502));
    assert_eq!(batch.messages.len(), 1);
    assert_eq!(batch.messages[0].text, "hello");
    assert_eq!(batch.messages[0].address.conversation_key(), "telegram:99:7");

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].1["offset"], 42);
}

#[tokio::test]
async fn get_me_returns_username() {
    let (channel, _calls) = mock().await;
    assert_eq!(channel.get_me().await.unwrap(), "authbot_test");
}
