//! Completion of the browser half of the sign-in handshake.
//!
//! [`LoginCallback::complete`] runs when the identity provider redirects
//! back. It validates the round-tripped `state`, exchanges the
//! authorization code, parks the tokens in the pending-login registry under
//! a fresh magic code, and only then announces the login on the event bus.

use std::sync::Arc;

use authbot_auth_engine::IdentityProvider;
use authbot_channels::ConversationAddress;
use authbot_store::{PendingLogin, PendingLoginRegistry, StoreError};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LoginError, LoginResult};
use crate::events::{LoginEvent, LoginEventBus};
use crate::magic_code::MagicCodeGenerator;

/// Fresh codes drawn before giving up on a collision streak.
const MAX_CODE_DRAWS: u32 = 5;

/// Query parameters of the provider redirect.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// The conversation address carried in `state`, if it parses.
    pub fn address(&self) -> LoginResult<ConversationAddress> {
        let raw = self
            .state
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| LoginError::InvalidState {
                reason: "missing state".into(),
            })?;
        ConversationAddress::from_state(raw).map_err(|e| LoginError::InvalidState {
            reason: e.to_string(),
        })
    }
}

/// Result of a completed callback, rendered by the web layer.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub magic_code: String,
    pub display_name: String,
    pub address: ConversationAddress,
}

/// Handles provider redirects. Shares only the registry and bus with the
/// chat side, so any number of callbacks may run concurrently.
pub struct LoginCallback {
    provider: Arc<dyn IdentityProvider>,
    registry: Arc<dyn PendingLoginRegistry>,
    bus: LoginEventBus,
    codes: MagicCodeGenerator,
}

impl LoginCallback {
    pub fn new(
        provider: Arc<dyn IdentityProvider>,
        registry: Arc<dyn PendingLoginRegistry>,
        bus: LoginEventBus,
    ) -> Self {
        Self {
            provider,
            registry,
            bus,
            codes: MagicCodeGenerator::new(),
        }
    }

    /// Provider authorization URL for a sign-in started from `address`.
    pub fn authorization_url(&self, address: &ConversationAddress) -> LoginResult<String> {
        let state = address.to_state().map_err(|e| LoginError::InvalidState {
            reason: e.to_string(),
        })?;
        self.provider
            .authorization_url(&state)
            .map_err(|e| LoginError::Authentication {
                reason: e.to_string(),
            })
    }

    pub async fn complete(&self, params: &CallbackParams) -> LoginResult<LoginOutcome> {
        if let Some(error) = params.error.as_deref() {
            let detail = params.error_description.as_deref().unwrap_or_default();
            warn!(error, detail, "identity provider returned an error");
            return Err(LoginError::Authentication {
                reason: format!("{error}: {detail}"),
            });
        }

        // Checked before the exchange so a forged redirect never spends the code.
        let address = params.address()?;
        let conversation = address.conversation_key();

        let code = params
            .code
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| LoginError::Authentication {
                reason: "missing authorization code".into(),
            })?;

        let assertion =
            self.provider
                .exchange_code(code)
                .await
                .map_err(|e| LoginError::Authentication {
                    reason: e.to_string(),
                })?;
        if assertion.subject.is_none() {
            return Err(LoginError::Authentication {
                reason: "id token carries neither oid nor sub".into(),
            });
        }

        for attempt in 1..=MAX_CODE_DRAWS {
            let magic_code = self.codes.generate()?;
            let login = PendingLogin {
                magic_code: magic_code.clone(),
                conversation_key: conversation.clone(),
                display_name: assertion.display_name.clone(),
                access_token: assertion.access_token.clone(),
                refresh_token: assertion.refresh_token.clone(),
                created_at: Utc::now(),
            };

            match self.registry.put(login).await {
                Ok(()) => {
                    let receivers = self.bus.publish(LoginEvent::LoginCompleted {
                        address: address.clone(),
                    });
                    info!(conversation = %conversation, receivers, "browser sign-in completed");
                    return Ok(LoginOutcome {
                        magic_code,
                        display_name: assertion.display_name,
                        address,
                    });
                }
                Err(StoreError::Conflict { .. }) => {
                    debug!(attempt, "magic code collision, drawing again");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(LoginError::CodeSpaceExhausted {
            attempts: MAX_CODE_DRAWS,
        })
    }
}

// ── tests ────────────────────────────────────────────────────────────
