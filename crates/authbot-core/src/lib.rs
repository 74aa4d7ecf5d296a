//! # authbot-core
//!
//! The sign-in handshake between a chat conversation and a browser.
//!
//! ```text
//!   chat ──▶ ConversationEngine ──▶ LoginDialog ──▶ SessionTokenStore
//!                  ▲                     │
//!                  │ LoginCompleted      │ take(code)
//!                  │                     ▼
//!             LoginEventBus ◀── LoginCallback ──▶ PendingLoginRegistry
//!                                      ▲
//!   browser ──▶ identity provider ─────┘ (code + state)
//! ```
//!
//! The web layer calls [`LoginCallback`]; the chat loop feeds
//! [`ConversationEngine`]. They share only the registry and the bus.

pub mod callback;
pub mod config;
pub mod dialog;
pub mod engine;
pub mod error;
pub mod events;
pub mod magic_code;
pub mod menu;
pub mod sweeper;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use callback::{CallbackParams, LoginCallback, LoginOutcome};
pub use config::{AuthBotConfig, PendingBackend};
pub use dialog::{DialogInput, DialogState, LoginDialog, Turn};
pub use engine::ConversationEngine;
pub use error::{ConfigError, LoginError, LoginResult};
pub use events::{LoginEvent, LoginEventBus};
pub use magic_code::MagicCodeGenerator;
pub use sweeper::{spawn_sweeper, sweep_interval};
