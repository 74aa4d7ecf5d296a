//! Periodic purge of expired pending logins.

use std::sync::Arc;
use std::time::Duration;

use authbot_store::PendingLoginRegistry;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Purge interval for a registry: half its TTL, at least one second.
pub fn sweep_interval(registry: &dyn PendingLoginRegistry) -> Duration {
    (registry.ttl() / 2).max(Duration::from_secs(1))
}

/// Run [`PendingLoginRegistry::sweep`] every `interval` until aborted.
pub fn spawn_sweeper(registry: Arc<dyn PendingLoginRegistry>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match registry.sweep().await {
                Ok(0) => {}
                Ok(dropped) => debug!(dropped, "expired pending logins purged"),
                Err(e) => warn!(error = %e, "pending login sweep failed"),
            }
        }
    })
}
