//! Pending-login registry.
//!
//! The web callback stores a [`PendingLogin`] under a freshly generated magic
//! code; the chat dialog claims it with [`PendingLoginRegistry::take`] when
//! the user types the code. `take` removes and returns in one atomic step, so
//! a code can be claimed at most once no matter how many callers race on it.
//! Entries older than the registry TTL are treated as absent.
//!
//! Two backends are provided:
//!
//! - [`MokaPendingLogins`]: in-process `moka` cache with `time_to_live`
//! - [`SqlitePendingLogins`]: durable rows, survives a bot restart

mod durable;
mod memory;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreResult;

pub use durable::SqlitePendingLogins;
pub use memory::MokaPendingLogins;

/// Default lifetime of an unclaimed magic code.
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(600);

/// A completed browser sign-in waiting to be claimed from the chat.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// One-time code shown to the user in the browser.
    pub magic_code: String,
    /// Conversation that requested the sign-in.
    pub conversation_key: String,
    /// Display name from the identity provider.
    pub display_name: String,
    /// Access token for the sign-in resource.
    pub access_token: String,
    /// Refresh token, when the provider granted offline access.
    pub refresh_token: Option<String>,
    /// When the callback stored this entry.
    pub created_at: DateTime<Utc>,
}

impl PendingLogin {
    /// Whether this entry has outlived `ttl` at `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.created_at);
        age.to_std().map(|age| age >= ttl).unwrap_or(false)
    }
}

// Tokens and codes stay out of logs.
impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("conversation_key", &self.conversation_key)
            .field("display_name", &self.display_name)
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// Keyed store of pending logins with atomic claim and bounded lifetime.
#[async_trait]
pub trait PendingLoginRegistry: Send + Sync {
    /// Store a pending login under its magic code.
    ///
    /// Any older pending login for the same conversation is dropped.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Conflict`] if the code is already held by
    /// a live entry; the caller should generate a new code.
    async fn put(&self, login: PendingLogin) -> StoreResult<()>;

    /// Remove and return the pending login for `code`.
    ///
    /// Returns `None` if the code was never issued, was already claimed, was
    /// released, or has expired.
    async fn take(&self, code: &str) -> StoreResult<Option<PendingLogin>>;

    /// Drop any pending login belonging to `conversation_key`.
    async fn release_conversation(&self, conversation_key: &str) -> StoreResult<bool>;

    /// Purge expired entries, returning how many were dropped.
    async fn sweep(&self) -> StoreResult<usize>;

    /// Number of live entries.
    async fn len(&self) -> StoreResult<usize>;

    /// The configured lifetime of an entry.
    fn ttl(&self) -> Duration;
}

// ── shared behavioural tests ─────────────────────────────────────────


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_is_measured_from_created_at() {
        let login = contract::login("x", "c");
        let ttl = Duration::from_secs(60);
        assert!(!login.is_expired_at(ttl, login.created_at));
        assert!(login.is_expired_at(ttl, login.created_at + chrono::Duration::seconds(60)));
    }

    #[test]
    fn debug_output_hides_secrets() {
        let login = contract::login("secret-code", "c");
        let rendered = format!("{login:?}");
        assert!(!rendered.contains("secret-code"));
        assert!(!rendered.contains("\"at\""));
    }
}
