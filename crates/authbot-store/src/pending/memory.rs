//! In-process pending-login registry on a `moka` TTL cache.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use moka::future::Cache;
use tokio::sync::Mutex;
use tracing::debug;

use super::{PendingLogin, PendingLoginRegistry};
use crate::error::{StoreError, StoreResult};

/// Upper bound on live pending logins held in memory.
const DEFAULT_MAX_CAPACITY: u64 = 100_000;

/// [`PendingLoginRegistry`] backed by `moka::future::Cache`.
///
/// The cache owns the entries; `by_conversation` is a secondary index from
/// conversation key to its current code, used by `quit` and by supersession.
/// Index entries whose code has already left the cache are harmless and are
/// pruned by [`PendingLoginRegistry::sweep`].
///
/// `put` and `release_conversation` each touch both maps and hold `writes`
/// while doing so; a release never lands between the two halves of a put.
#[derive(Clone)]
pub struct MokaPendingLogins {
    codes: Cache<String, PendingLogin>,
    by_conversation: Arc<DashMap<String, String>>,
    writes: Arc<Mutex<()>>,
    ttl: Duration,
}

impl MokaPendingLogins {
    /// Create a registry whose entries live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_MAX_CAPACITY)
    }

    /// Create a registry with an explicit capacity bound.
    pub fn with_capacity(ttl: Duration, max_capacity: u64) -> Self {
        let codes = Cache::builder()
            .name("pending_logins")
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .build();
        Self {
            codes,
            by_conversation: Arc::new(DashMap::new()),
            writes: Arc::new(Mutex::new(())),
            ttl,
        }
    }
}

#[async_trait]
impl PendingLoginRegistry for MokaPendingLogins {
    async fn put(&self, login: PendingLogin) -> StoreResult<()> {
        let code = login.magic_code.clone();
        let conversation = login.conversation_key.clone();

        let _writes = self.writes.lock().await;
        let entry = self.codes.entry(code.clone()).or_insert(login).await;
        if !entry.is_fresh() {
            return Err(StoreError::Conflict {
                entity: "pending login",
            });
        }

        if let Some(previous) = self.by_conversation.insert(conversation.clone(), code.clone())
            && previous != code
        {
            self.codes.invalidate(&previous).await;
            debug!(conversation = %conversation, "superseded older pending login");
        }

        debug!(conversation = %conversation, "pending login stored");
        Ok(())
    }

    async fn take(&self, code: &str) -> StoreResult<Option<PendingLogin>> {
        let Some(login) = self.codes.remove(code).await else {
            return Ok(None);
        };

        self.by_conversation
            .remove_if(&login.conversation_key, |_, current| current == code);

        if login.is_expired_at(self.ttl, Utc::now()) {
            debug!(conversation = %login.conversation_key, "pending login expired before claim");
            return Ok(None);
        }

        debug!(conversation = %login.conversation_key, "pending login claimed");
        Ok(Some(login))
    }

    async fn release_conversation(&self, conversation_key: &str) -> StoreResult<bool> {
        let _writes = self.writes.lock().await;
        let Some((_, code)) = self.by_conversation.remove(conversation_key) else {
            return Ok(false);
        };
        let released = self.codes.remove(&code).await.is_some();
        debug!(conversation = %conversation_key, released, "pending login released");
        Ok(released)
    }

    async fn sweep(&self) -> StoreResult<usize> {
        self.codes.run_pending_tasks().await;

        let before = self.by_conversation.len();
        self.by_conversation
            .retain(|_, code| self.codes.contains_key(code.as_str()));
        let dropped = before.saturating_sub(self.by_conversation.len());

        if dropped > 0 {
            debug!(dropped, "swept expired pending logins");
        }
        Ok(dropped)
    }

    async fn len(&self) -> StoreResult<usize> {
        self.codes.run_pending_tasks().await;
        Ok(self.codes.entry_count() as usize)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

// ── tests ────────────────────────────────────────────────────────────
