//! The chat half of the sign-in handshake.
//!
//! [`LoginDialog::step`] is a transition function: it takes the current
//! [`DialogState`] of one conversation and one [`DialogInput`], performs the
//! store and refresh calls the transition needs, and returns the next state
//! plus the replies to send. The conversation engine owns the state and
//! guarantees one step at a time per conversation.
//!
//! ```text
//! NotLoggedIn ──(no session)──▶ AwaitingBrowserLogin ──LoginCompleted──▶ AwaitingMagicCode{n}
//!      │                               │                                    │      │
//!      └─(session, refresh ok)──▶ LoggedIn ◀───────(code ok, refresh ok)─────┘      │
//!                                      │                                           │
//!                     menu action ─────┴──▶ NotLoggedIn           quit ──▶ QuitRequested
//! ```
//!
//! A `LoginCompleted` that reaches a conversation which already quit or is
//! signed in does not reopen the handshake: its pending login is released.

use std::sync::Arc;

use authbot_auth_engine::{RefreshedTokens, TokenRefresher};
use authbot_channels::{ConversationAddress, Outgoing};
use authbot_store::{PendingLogin, PendingLoginRegistry, SessionTokenStore, SessionTokens};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_MAX_CODE_ATTEMPTS, sign_in_link};
use crate::error::{LoginError, LoginResult};
use crate::magic_code::{CODE_BYTES, normalize};
use crate::menu::{self, MenuChoice, MenuOutcome};

pub const SIGN_IN_TEXT: &str = "Let's get started! Please sign in below...";
pub const SIGN_IN_BUTTON: &str = "Sign-In";
pub const MUST_SIGN_IN: &str = "You must first sign into your account.";
pub const CLICK_LINK: &str = "Please click the sign-in link.";
pub const ENTER_CODE: &str = "Please enter the code you received or type 'quit' to end.";
pub const INVALID_CODE: &str = "hmm... Looks like that was an invalid code. Please try again.";
pub const TOO_MANY_CODES: &str =
    "That was too many invalid codes. Send me a message to start signing in again.";
pub const REFRESH_FAILED: &str =
    "I couldn't refresh your sign-in. Please sign in again.";
pub const SIGN_IN_FAILED: &str =
    "Something went wrong finishing your sign-in. Send me a message to try again.";
pub const GOODBYE: &str = "Goodbye!";
pub const LOGGED_OUT: &str = "Goodbye! You have been logged out.";

const QUIT: &str = "quit";

/// Where a conversation is in the sign-in handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DialogState {
    #[default]
    NotLoggedIn,
    /// Sign-in link sent; waiting for the browser to finish.
    AwaitingBrowserLogin,
    /// Browser finished; waiting for the user to type the code.
    AwaitingMagicCode { attempts: u32 },
    /// Signed in and shown the menu.
    LoggedIn { menu_retries: u32 },
    /// The user quit. The next message starts over.
    QuitRequested,
}

/// What drives a dialog step.
#[derive(Debug, Clone, Copy)]
pub enum DialogInput<'a> {
    Message(&'a str),
    /// The browser sign-in for this conversation completed.
    LoginCompleted,
}

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Turn {
    pub state: DialogState,
    pub replies: Vec<Outgoing>,
}

impl Turn {
    fn new(state: DialogState) -> Self {
        Self {
            state,
            replies: Vec::new(),
        }
    }

    fn say(mut self, text: impl Into<String>) -> Self {
        self.replies.push(Outgoing::text(text));
        self
    }

    fn then(mut self, next: Turn) -> Self {
        self.replies.extend(next.replies);
        self.state = next.state;
        self
    }
}

/// The chat-side sign-in dialog.
pub struct LoginDialog {
    sessions: Arc<dyn SessionTokenStore>,
    registry: Arc<dyn PendingLoginRegistry>,
    refresher: Arc<dyn TokenRefresher>,
    callback_host: String,
    max_code_attempts: u32,
}

impl LoginDialog {
    pub fn new(
        sessions: Arc<dyn SessionTokenStore>,
        registry: Arc<dyn PendingLoginRegistry>,
        refresher: Arc<dyn TokenRefresher>,
        callback_host: impl Into<String>,
    ) -> Self {
        Self {
            sessions,
            registry,
            refresher,
            callback_host: callback_host.into(),
            max_code_attempts: DEFAULT_MAX_CODE_ATTEMPTS,
        }
    }

    pub fn with_max_code_attempts(mut self, attempts: u32) -> Self {
        self.max_code_attempts = attempts.max(1);
        self
    }

    /// Advance `state` by one input.
    pub async fn step(
        &self,
        address: &ConversationAddress,
        state: DialogState,
        input: DialogInput<'_>,
    ) -> LoginResult<Turn> {
        let key = address.conversation_key();
        debug!(conversation = %key, ?state, "dialog step");

        match (state, input) {
            (DialogState::AwaitingMagicCode { attempts }, DialogInput::LoginCompleted) => {
                Ok(Turn::new(DialogState::AwaitingMagicCode { attempts }).say(ENTER_CODE))
            }
            (
                state @ (DialogState::QuitRequested | DialogState::LoggedIn { .. }),
                DialogInput::LoginCompleted,
            ) => {
                let released = self.registry.release_conversation(&key).await?;
                info!(conversation = %key, ?state, released, "ignoring late browser sign-in");
                Ok(Turn::new(state))
            }
            (_, DialogInput::LoginCompleted) => {
                Ok(Turn::new(DialogState::AwaitingMagicCode { attempts: 0 }).say(ENTER_CODE))
            }

            (
                DialogState::NotLoggedIn | DialogState::QuitRequested,
                DialogInput::Message(_),
            ) => self.enter(address).await,

            (DialogState::AwaitingBrowserLogin, DialogInput::Message(text)) => {
                if is_quit(text) {
                    return self.quit(&key).await;
                }
                if looks_like_code(text) {
                    // The completion event was missed; accept the code anyway.
                    return self.validate(address, text, 0).await;
                }
                Ok(Turn::new(DialogState::AwaitingBrowserLogin).say(CLICK_LINK))
            }

            (DialogState::AwaitingMagicCode { attempts }, DialogInput::Message(text)) => {
                if is_quit(text) {
                    return self.quit(&key).await;
                }
                self.validate(address, text, attempts).await
            }

            (DialogState::LoggedIn { menu_retries }, DialogInput::Message(text)) => {
                self.menu(&key, text, menu_retries).await
            }
        }
    }

    /// Dialog entry: resume a stored session or start a browser sign-in.
    async fn enter(&self, address: &ConversationAddress) -> LoginResult<Turn> {
        let key = address.conversation_key();
        let Some(session) = self.sessions.get(&key).await? else {
            return self.sign_in_prompt(address);
        };

        match self.refresh(&session.refresh_token).await {
            Ok(refreshed) => {
                self.sessions
                    .update_refreshed(
                        &key,
                        &refreshed.access_token,
                        refreshed.refresh_token.as_deref(),
                    )
                    .await?;
                info!(conversation = %key, "session refreshed");
                Ok(logged_in(&session.user_name))
            }
            Err(LoginError::Refresh(e)) => {
                warn!(conversation = %key, error = %e, "silent refresh failed, clearing session");
                self.sessions.clear(&key).await?;
                Ok(Turn::new(DialogState::NotLoggedIn)
                    .say(REFRESH_FAILED)
                    .then(self.sign_in_prompt(address)?))
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> LoginResult<RefreshedTokens> {
        self.refresher
            .refresh(refresh_token)
            .await
            .map_err(LoginError::Refresh)
    }

    fn sign_in_prompt(&self, address: &ConversationAddress) -> LoginResult<Turn> {
        let url = sign_in_link(&self.callback_host, address).map_err(|e| {
            LoginError::InvalidState {
                reason: e.to_string(),
            }
        })?;
        let mut turn = Turn::new(DialogState::AwaitingBrowserLogin);
        turn.replies.push(Outgoing::SignIn {
            text: SIGN_IN_TEXT.into(),
            button: SIGN_IN_BUTTON.into(),
            url,
        });
        Ok(turn.say(MUST_SIGN_IN))
    }

    async fn quit(&self, key: &str) -> LoginResult<Turn> {
        let released = self.registry.release_conversation(key).await?;
        info!(conversation = %key, released, "user quit sign-in");
        Ok(Turn::new(DialogState::QuitRequested).say(GOODBYE))
    }

    async fn validate(
        &self,
        address: &ConversationAddress,
        text: &str,
        attempts: u32,
    ) -> LoginResult<Turn> {
        let key = address.conversation_key();
        match self.claim(&key, text).await {
            Ok(login) => self.finish_sign_in(&key, login).await,
            Err(LoginError::CodeMismatch | LoginError::CodeExpiredOrConsumed) => {
                let attempts = attempts + 1;
                if attempts >= self.max_code_attempts {
                    self.registry.release_conversation(&key).await?;
                    info!(conversation = %key, attempts, "magic code attempts exhausted");
                    return Ok(Turn::new(DialogState::NotLoggedIn).say(TOO_MANY_CODES));
                }
                Ok(Turn::new(DialogState::AwaitingMagicCode { attempts })
                    .say(INVALID_CODE)
                    .say(ENTER_CODE))
            }
            Err(e) => Err(e),
        }
    }

    /// Take the pending login for `text` if it belongs to this conversation.
    async fn claim(&self, key: &str, text: &str) -> LoginResult<PendingLogin> {
        let code = normalize(text);
        let login = self
            .registry
            .take(&code)
            .await?
            .ok_or(LoginError::CodeExpiredOrConsumed)?;
        if login.conversation_key != key {
            // The code is burned; its owner has to sign in again.
            warn!(conversation = %key, "magic code presented by another conversation");
            return Err(LoginError::CodeMismatch);
        }
        Ok(login)
    }

    async fn finish_sign_in(&self, key: &str, login: PendingLogin) -> LoginResult<Turn> {
        let Some(refresh_token) = login.refresh_token.as_deref() else {
            warn!(conversation = %key, "sign-in granted no refresh token");
            return Ok(Turn::new(DialogState::NotLoggedIn).say(SIGN_IN_FAILED));
        };

        let refreshed = match self.refresh(refresh_token).await {
            Ok(refreshed) => refreshed,
            Err(LoginError::Refresh(e)) => {
                warn!(conversation = %key, error = %e, "refresh after sign-in failed");
                return Ok(Turn::new(DialogState::NotLoggedIn).say(SIGN_IN_FAILED));
            }
            Err(e) => return Err(e),
        };

        let tokens = SessionTokens {
            user_name: login.display_name.clone(),
            access_token: login.access_token,
            refresh_token: refreshed
                .refresh_token
                .unwrap_or_else(|| refresh_token.to_string()),
            access_token_crm: refreshed.access_token,
            updated_at: Utc::now().timestamp(),
        };
        self.sessions.put(key, &tokens).await?;
        info!(conversation = %key, "user signed in");
        Ok(logged_in(&login.display_name))
    }

    async fn menu(&self, key: &str, text: &str, retries: u32) -> LoginResult<Turn> {
        match menu::answer(text, retries) {
            MenuOutcome::Chosen(MenuChoice::Account) => {
                let reply = match self.sessions.get(key).await? {
                    Some(session) => account_summary(&session),
                    None => "You are not signed in.".to_string(),
                };
                Ok(Turn::new(DialogState::NotLoggedIn).say(reply))
            }
            MenuOutcome::Chosen(MenuChoice::Logout) => {
                self.sessions.clear(key).await?;
                self.registry.release_conversation(key).await?;
                info!(conversation = %key, "user logged out");
                Ok(Turn::new(DialogState::NotLoggedIn).say(LOGGED_OUT))
            }
            MenuOutcome::Retry(menu_retries) => Ok(Turn::new(DialogState::LoggedIn {
                menu_retries,
            })
            .say(menu::INVALID_CHOICE)
            .say(menu::MENU_PROMPT)),
            MenuOutcome::GiveUp => {
                Ok(Turn::new(DialogState::NotLoggedIn).say(menu::TOO_MANY_ATTEMPTS))
            }
        }
    }
}

fn logged_in(user_name: &str) -> Turn {
    Turn::new(DialogState::LoggedIn { menu_retries: 0 })
        .say(format!("Welcome {user_name}!"))
        .say(menu::MENU_PROMPT)
}

fn account_summary(session: &SessionTokens) -> String {
    let refreshed = chrono::DateTime::from_timestamp(session.updated_at, 0)
        .map(|t| t.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "unknown".into());
    format!(
        "Signed in as {}. Session last refreshed {refreshed}.",
        session.user_name
    )
}

fn is_quit(text: &str) -> bool {
    text.trim().eq_ignore_ascii_case(QUIT)
}

fn looks_like_code(text: &str) -> bool {
    let code = normalize(text);
    code.len() == CODE_BYTES * 2 && code.chars().all(|c| c.is_ascii_hexdigit())
}

// ── tests ────────────────────────────────────────────────────────────
