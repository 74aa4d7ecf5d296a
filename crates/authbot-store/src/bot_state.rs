//! Small key-value table for bot bookkeeping that must survive restarts.
//!
//! The only structured value today is the Telegram `getUpdates` offset; the
//! bot advances it after each batch so a restart does not replay messages.

use tracing::{debug, instrument};

use crate::db::Database;
use crate::error::StoreResult;

/// Key under which the next Telegram update id is kept.
const TELEGRAM_OFFSET_KEY: &str = "telegram.update_offset";

/// Persistent key-value store for bot state.
#[derive(Clone)]
pub struct BotStateStore {
    db: Database,
}

impl BotStateStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Raw string value for `key`.
    #[instrument(skip(self))]
    pub async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let key = key.to_string();
        self.db
            .execute(move |conn| {
                let result = conn.query_row(
                    "SELECT value FROM bot_state WHERE key = ?1",
                    rusqlite::params![key],
                    |row| row.get(0),
                );
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
    }

    #[instrument(skip(self, value))]
    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let key = key.to_string();
        let value = value.to_string();
        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO bot_state (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value",
                    rusqlite::params![key, value],
                )?;
                debug!(key = %key, "bot state updated");
                Ok(())
            })
            .await
    }

    /// Next Telegram update id to request, if one was recorded.
    ///
    /// A corrupt value reads as `None`, which restarts polling from the
    /// server's oldest unconfirmed update.
    pub async fn telegram_offset(&self) -> StoreResult<Option<i64>> {
        let value = self.get(TELEGRAM_OFFSET_KEY).await?;
        Ok(value.and_then(|v| v.parse().ok()))
    }

    pub async fn set_telegram_offset(&self, offset: i64) -> StoreResult<()> {
        self.set(TELEGRAM_OFFSET_KEY, &offset.to_string()).await
    }
}

// ── tests ────────────────────────────────────────────────────────────
