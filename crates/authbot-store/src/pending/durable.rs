//! SQLite-backed pending-login registry.
//!
//! Each operation is a single closure run under the database mutex, and
//! `take` is one `DELETE ... RETURNING` statement, so claim is atomic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use super::{PendingLogin, PendingLoginRegistry};
use crate::db::Database;
use crate::error::{StoreError, StoreResult};

/// Durable [`PendingLoginRegistry`] on the `pending_logins` table.
#[derive(Clone)]
pub struct SqlitePendingLogins {
    db: Database,
    ttl: Duration,
}

impl SqlitePendingLogins {
    /// Create a registry backed by `db` whose entries live for `ttl`.
    pub fn new(db: Database, ttl: Duration) -> Self {
        Self { db, ttl }
    }

    /// Creation timestamps at or before this cutoff are expired.
    fn cutoff_ms(&self) -> i64 {
        let ttl_ms = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        Utc::now().timestamp_millis().saturating_sub(ttl_ms)
    }
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[async_trait]
impl PendingLoginRegistry for SqlitePendingLogins {
    #[instrument(skip(self, login), fields(conversation = %login.conversation_key))]
    async fn put(&self, login: PendingLogin) -> StoreResult<()> {
        let cutoff = self.cutoff_ms();
        self.db
            .execute_mut(move |conn| {
                let tx = conn.transaction()?;

                tx.execute(
                    "DELETE FROM pending_logins WHERE created_at_ms <= ?1",
                    rusqlite::params![cutoff],
                )?;

                let taken: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM pending_logins WHERE magic_code = ?1)",
                    rusqlite::params![login.magic_code],
                    |row| row.get(0),
                )?;
                if taken {
                    return Err(StoreError::Conflict {
                        entity: "pending login",
                    });
                }

                let superseded = tx.execute(
                    "DELETE FROM pending_logins WHERE conversation_key = ?1",
                    rusqlite::params![login.conversation_key],
                )?;

                tx.execute(
                    "INSERT INTO pending_logins \
                     (magic_code, conversation_key, display_name, access_token, refresh_token, created_at_ms) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    rusqlite::params![
                        login.magic_code,
                        login.conversation_key,
                        login.display_name,
                        login.access_token,
                        login.refresh_token,
                        login.created_at.timestamp_millis()
                    ],
                )?;
                tx.commit()?;

                debug!(superseded, "pending login stored");
                Ok(())
            })
            .await
    }

    async fn take(&self, code: &str) -> StoreResult<Option<PendingLogin>> {
        let code = code.to_string();
        let ttl = self.ttl;
        let claimed = self
            .db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        "DELETE FROM pending_logins WHERE magic_code = ?1 \
                         RETURNING magic_code, conversation_key, display_name, access_token, \
                                   refresh_token, created_at_ms",
                        rusqlite::params![code],
                        |row| {
                            Ok(PendingLogin {
                                magic_code: row.get(0)?,
                                conversation_key: row.get(1)?,
                                display_name: row.get(2)?,
                                access_token: row.get(3)?,
                                refresh_token: row.get(4)?,
                                created_at: from_millis(row.get(5)?),
                            })
                        },
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        match claimed {
            Some(login) if login.is_expired_at(ttl, Utc::now()) => {
                debug!(conversation = %login.conversation_key, "pending login expired before claim");
                Ok(None)
            }
            Some(login) => {
                debug!(conversation = %login.conversation_key, "pending login claimed");
                Ok(Some(login))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self))]
    async fn release_conversation(&self, conversation_key: &str) -> StoreResult<bool> {
        let key = conversation_key.to_string();
        self.db
            .execute(move |conn| {
                let deleted = conn.execute(
                    "DELETE FROM pending_logins WHERE conversation_key = ?1",
                    rusqlite::params![key],
                )?;
                Ok(deleted > 0)
            })
            .await
    }

    async fn sweep(&self) -> StoreResult<usize> {
        let cutoff = self.cutoff_ms();
        let dropped = self
            .db
            .execute(move |conn| {
                Ok(conn.execute(
                    "DELETE FROM pending_logins WHERE created_at_ms <= ?1",
                    rusqlite::params![cutoff],
                )?)
            })
            .await?;
        if dropped > 0 {
            debug!(dropped, "swept expired pending logins");
        }
        Ok(dropped)
    }

    async fn len(&self) -> StoreResult<usize> {
        let cutoff = self.cutoff_ms();
        let count: i64 = self
            .db
            .execute(move |conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM pending_logins WHERE created_at_ms > ?1",
                    rusqlite::params![cutoff],
                    |row| row.get(0),
                )?)
            })
            .await?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::super::contract;
    use super::*;

    async fn registry(ttl: Duration) -> SqlitePendingLogins {
        SqlitePendingLogins::new(Database::in_memory_migrated().await.unwrap(), ttl)
    }

    #[tokio::test]
    async fn take_returns_entry_once() {
        contract::take_returns_entry_once(&registry(Duration::from_secs(60)).await).await;
    }

    #[tokio::test]
    async fn take_unknown_is_none() {
        contract::take_unknown_is_none(&registry(Duration::from_secs(60)).await).await;
    }

    #[tokio::test]
    async fn duplicate_code_conflicts() {
        contract::duplicate_code_conflicts(&registry(Duration::from_secs(60)).await).await;
    }

    #[tokio::test]
    async fn newer_login_supersedes_older() {
        contract::newer_login_supersedes_older(&registry(Duration::from_secs(60)).await).await;
    }

    #[tokio::test]
    async fn release_conversation_drops_entry() {
        contract::release_conversation_drops_entry(&registry(Duration::from_secs(60)).await)
            .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_take_has_one_winner() {
        let registry = registry(Duration::from_secs(60)).await;
        contract::concurrent_take_has_one_winner(Arc::new(registry)).await;
    }

    #[tokio::test]
    async fn expired_entry_is_not_returned() {
        contract::expired_entry_is_not_returned(&registry(Duration::from_millis(200)).await).await;
    }

    #[tokio::test]
    async fn sweep_purges_expired() {
        contract::sweep_purges_expired(&registry(Duration::from_millis(200)).await).await;
    }

    #[tokio::test]
    async fn expired_code_can_be_reissued() {
        let registry = registry(Duration::from_millis(100)).await;
        registry.put(contract::login("reuse001", "a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        registry.put(contract::login("reuse001", "b")).await.unwrap();
        let got = registry.take("reuse001").await.unwrap().unwrap();
        assert_eq!(got.conversation_key, "b");
    }

    #[tokio::test]
    async fn survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.db");

        {
            let db = Database::open_and_migrate(path.clone()).await.unwrap();
            let registry = SqlitePendingLogins::new(db, Duration::from_secs(60));
            registry.put(contract::login("disk0001", "a")).await.unwrap();
        }

        let db = Database::open_and_migrate(path).await.unwrap();
        let registry = SqlitePendingLogins::new(db, Duration::from_secs(60));
        assert!(registry.take("disk0001").await.unwrap().is_some());
    }
}
