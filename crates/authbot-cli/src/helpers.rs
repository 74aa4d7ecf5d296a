//! Shared helpers for the subcommands.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use authbot_core::{AuthBotConfig, PendingBackend};
use authbot_store::{Database, MokaPendingLogins, PendingLoginRegistry, SqlitePendingLogins};
use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with the given default log level.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }
}

/// Open the database, creating its parent directory on first use.
pub async fn open_database(path: &Path) -> Result<Database> {
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }
    Database::open_and_migrate(path.to_path_buf())
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

/// The pending-login registry selected by the configuration.
pub fn pending_registry(config: &AuthBotConfig, db: &Database) -> Arc<dyn PendingLoginRegistry> {
    match config.pending_backend {
        PendingBackend::Memory => Arc::new(MokaPendingLogins::new(config.code_ttl)),
        PendingBackend::Sqlite => Arc::new(SqlitePendingLogins::new(db.clone(), config.code_ttl)),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn open_database_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("authbot.db");
        open_database(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn registry_follows_backend_setting() {
        let db = Database::in_memory_migrated().await.unwrap();
        let mut config = AuthBotConfig::from_lookup(|var| match var {
            "MICROSOFT_CLIENT_ID" => Some("id".into()),
            "MICROSOFT_CLIENT_SECRET" => Some("secret".into()),
            "MICROSOFT_REALM" => Some("contoso".into()),
            "AUTHBOT_CALLBACKHOST" => Some("https://bot.example.com".into()),
            "AUTHBOT_CODE_TTL_SECS" => Some("42".into()),
            _ => None,
        })
        .unwrap();

        config.pending_backend = PendingBackend::Sqlite;
        let registry = pending_registry(&config, &db);
        assert_eq!(registry.ttl(), Duration::from_secs(42));

        config.pending_backend = PendingBackend::Memory;
        assert_eq!(pending_registry(&config, &db).ttl(), Duration::from_secs(42));
    }
}
