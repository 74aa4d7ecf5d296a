//! Request handlers.

use std::sync::Arc;

use authbot_channels::ConversationAddress;
use authbot_core::config::LOGIN_PATH;
use authbot_core::{CallbackParams, LoginError};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::pages;
use crate::state::AppState;

/// Query of `GET /login`.
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    pub address: Option<String>,
}

/// Response body of `GET /api/status`.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub version: String,
    /// Live pending logins, `None` if the registry could not be read.
    pub pending_logins: Option<usize>,
}

/// A `302 Found` to `location`.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

fn failure(status: StatusCode, detail: &str) -> Response {
    (status, Html(pages::failure_page(detail))).into_response()
}

/// `GET /login?address=...`: send the browser to the identity provider.
pub async fn login(State(state): State<Arc<AppState>>, Query(query): Query<LoginQuery>) -> Response {
    let Some(raw) = query.address.as_deref() else {
        return failure(StatusCode::BAD_REQUEST, "The sign-in link is incomplete.");
    };
    let address = match ConversationAddress::from_state(raw) {
        Ok(address) => address,
        Err(e) => {
            warn!(error = %e, "rejected sign-in link");
            return failure(StatusCode::BAD_REQUEST, "The sign-in link is not valid.");
        }
    };

    match state.callback.authorization_url(&address) {
        Ok(url) => found(&url),
        Err(e) => {
            warn!(error = %e, "cannot build authorization URL");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Sign-in is unavailable right now.")
        }
    }
}

/// `GET /api/OAuthCallback`: the identity provider's redirect.
pub async fn oauth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    match state.callback.complete(&params).await {
        Ok(outcome) => {
            info!(conversation = %outcome.address.conversation_key(), "magic code issued");
            Html(pages::magic_code_page(&outcome.display_name, &outcome.magic_code)).into_response()
        }
        Err(LoginError::Authentication { reason }) => {
            warn!(%reason, "authentication failed, restarting sign-in");
            match params.address().ok().and_then(|a| retry_link(&a)) {
                Some(link) => found(&link),
                None => found(LOGIN_PATH),
            }
        }
        Err(LoginError::InvalidState { reason }) => {
            warn!(%reason, "callback with invalid state");
            failure(StatusCode::BAD_REQUEST, "This sign-in response could not be matched to a chat.")
        }
        Err(e) => {
            warn!(error = %e, "callback failed");
            failure(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong completing sign-in.")
        }
    }
}

/// Relative `/login?address=...` link restarting the sign-in for `address`.
fn retry_link(address: &ConversationAddress) -> Option<String> {
    let state = address.to_state().ok()?;
    let encoded: String = url::form_urlencoded::byte_serialize(state.as_bytes()).collect();
    Some(format!("{LOGIN_PATH}?address={encoded}"))
}

/// `GET /api/status`.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let pending_logins = match state.registry.len().await {
        Ok(n) => Some(n),
        Err(e) => {
            warn!(error = %e, "pending login registry unavailable");
            None
        }
    };
    Json(StatusResponse {
        status: if pending_logins.is_some() { "ok" } else { "degraded" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        pending_logins,
    })
}
