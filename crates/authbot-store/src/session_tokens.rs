//! Per-conversation session tokens.
//!
//! A [`SessionTokens`] row exists for a conversation exactly while its user
//! is signed in. The row is written only once a refresh has produced the
//! CRM access token, so a stored refresh token always has a matching access
//! token from the same or a later refresh.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Tokens held for a signed-in conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTokens {
    /// Display name captured at sign-in.
    pub user_name: String,
    /// Access token for the sign-in resource.
    pub access_token: String,
    /// Refresh token, rotated whenever the provider issues a new one.
    pub refresh_token: String,
    /// Access token for the CRM resource, renewed on every dialog entry.
    pub access_token_crm: String,
    /// Unix timestamp of the last write.
    pub updated_at: i64,
}

/// Storage interface for [`SessionTokens`], keyed by conversation key.
#[async_trait]
pub trait SessionTokenStore: Send + Sync {
    /// Fetch the tokens for a conversation, if signed in.
    async fn get(&self, conversation_key: &str) -> StoreResult<Option<SessionTokens>>;

    /// Insert or replace the tokens for a conversation.
    async fn put(&self, conversation_key: &str, tokens: &SessionTokens) -> StoreResult<()>;

    /// Record the result of a refresh. Returns `false` if the conversation
    /// has no session.
    async fn update_refreshed(
        &self,
        conversation_key: &str,
        access_token_crm: &str,
        rotated_refresh_token: Option<&str>,
    ) -> StoreResult<bool>;

    /// Remove the session. Returns `true` if one existed.
    async fn clear(&self, conversation_key: &str) -> StoreResult<bool>;
}

/// SQLite-backed [`SessionTokenStore`].
#[derive(Clone)]
pub struct SqliteSessionTokenStore {
    db: Database,
}

impl SqliteSessionTokenStore {
    /// Create a new store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionTokenStore for SqliteSessionTokenStore {
    #[instrument(skip(self))]
    async fn get(&self, conversation_key: &str) -> StoreResult<Option<SessionTokens>> {
        let key = conversation_key.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT user_name, access_token, refresh_token, access_token_crm, updated_at \
                     FROM session_tokens WHERE conversation_key = ?1",
                    rusqlite::params![key],
                    |row| {
                        Ok(SessionTokens {
                            user_name: row.get(0)?,
                            access_token: row.get(1)?,
                            refresh_token: row.get(2)?,
                            access_token_crm: row.get(3)?,
                            updated_at: row.get(4)?,
                        })
                    },
                );
                match result {
                    Ok(tokens) => Ok(Some(tokens)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    #[instrument(skip(self, tokens))]
    async fn put(&self, conversation_key: &str, tokens: &SessionTokens) -> StoreResult<()> {
        let key = conversation_key.to_string();
        let tokens = tokens.clone();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO session_tokens \
                     (conversation_key, user_name, access_token, refresh_token, access_token_crm, updated_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(conversation_key) DO UPDATE SET \
                        user_name = excluded.user_name, \
                        access_token = excluded.access_token, \
                        refresh_token = excluded.refresh_token, \
                        access_token_crm = excluded.access_token_crm, \
                        updated_at = excluded.updated_at",
                    rusqlite::params![
                        key,
                        tokens.user_name,
                        tokens.access_token,
                        tokens.refresh_token,
                        tokens.access_token_crm,
                        tokens.updated_at
                    ],
                )?;
                debug!(conversation = %key, "session tokens stored");
                Ok(())
            })
            .await
    }

    #[instrument(skip(self, access_token_crm, rotated_refresh_token))]
    async fn update_refreshed(
        &self,
        conversation_key: &str,
        access_token_crm: &str,
        rotated_refresh_token: Option<&str>,
    ) -> StoreResult<bool> {
        let key = conversation_key.to_string();
        let crm = access_token_crm.to_string();
        let rotated = rotated_refresh_token.map(String::from);
        let now = Utc::now().timestamp();
        self.db
            .execute(move |conn| {
                let updated = conn.execute(
                    "UPDATE session_tokens SET \
                        access_token_crm = ?2, \
                        refresh_token = COALESCE(?3, refresh_token), \
                        updated_at = ?4 \
                     WHERE conversation_key = ?1",
                    rusqlite::params![key, crm, rotated, now],
                )?;
                Ok(updated > 0)
            })
            .await
    }

    #[instrument(skip(self))]
    async fn clear(&self, conversation_key: &str) -> StoreResult<bool> {
        let key = conversation_key.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM session_tokens WHERE conversation_key = ?1",
                    rusqlite::params![key],
                )?;
                Ok(deleted > 0)
            })
            .await
    }
}

// ── tests ────────────────────────────────────────────────────────────
