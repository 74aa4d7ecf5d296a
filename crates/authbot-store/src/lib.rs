//! # authbot-store
//!
//! Persistence for AuthBot.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │  PendingLoginRegistry                        │
//! │    MokaPendingLogins   (moka TTL cache)      │
//! │    SqlitePendingLogins (pending_logins rows) │
//! ├──────────────────────────────────────────────┤
//! │  SessionTokenStore  (session_tokens rows)    │
//! │  BotStateStore      (bot_state key/value)    │
//! ├──────────────────────────────────────────────┤
//! │  Database (rusqlite WAL)                     │
//! │  Migrations (versioned, transactional)       │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use authbot_store::{Database, MokaPendingLogins, SqliteSessionTokenStore, DEFAULT_PENDING_TTL};
//!
//! let db = Database::open_and_migrate("data/authbot.db").await?;
//! let sessions = SqliteSessionTokenStore::new(db.clone());
//! let pending = MokaPendingLogins::new(DEFAULT_PENDING_TTL);
//! ```

pub mod bot_state;
pub mod db;
pub mod error;
pub mod migration;
pub mod pending;
pub mod session_tokens;

// ── re-exports ───────────────────────────────────────────────────────

pub use bot_state::BotStateStore;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use pending::{
    DEFAULT_PENDING_TTL, MokaPendingLogins, PendingLogin, PendingLoginRegistry,
    SqlitePendingLogins,
};
pub use session_tokens::{SessionTokenStore, SessionTokens, SqliteSessionTokenStore};
