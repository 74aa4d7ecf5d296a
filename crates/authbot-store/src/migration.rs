//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The current version is tracked in a `_migrations` table so migrations
//! are idempotent and only run once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "per-conversation session tokens",
        sql: r#"
            CREATE TABLE session_tokens (
                conversation_key TEXT PRIMARY KEY,
                user_name        TEXT NOT NULL,
                access_token     TEXT NOT NULL,
                refresh_token    TEXT NOT NULL,
                access_token_crm TEXT NOT NULL,
                updated_at       INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: 2,
        description: "durable pending logins keyed by magic code",
        sql: r#"
            CREATE TABLE pending_logins (
                magic_code       TEXT PRIMARY KEY,
                conversation_key TEXT NOT NULL,
                display_name     TEXT NOT NULL,
                access_token     TEXT NOT NULL,
                refresh_token    TEXT,
                created_at_ms    INTEGER NOT NULL
            );
            CREATE INDEX idx_pending_logins_conversation ON pending_logins(conversation_key);
            CREATE INDEX idx_pending_logins_created ON pending_logins(created_at_ms);
        "#,
    },
    Migration {
        version: 3,
        description: "bot state key-value table",
        sql: r#"
            CREATE TABLE bot_state (
                key   TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
    },
];

/// Run every migration newer than the recorded schema version.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to read current version: {e}"),
    })
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("failed to create _migrations table: {e}"),
    })
}

/// Apply a single migration inside a transaction.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    info!(
        version = migration.version,
        description = migration.description,
        "applying migration"
    );

    let fail = |stage: &str, e: rusqlite::Error| StoreError::Migration {
        version: migration.version,
        message: format!("{stage}: {e}"),
    };

    // `conn.transaction()` needs `&mut Connection`; manage it by hand.
    conn.execute_batch("BEGIN IMMEDIATE;")
        .map_err(|e| fail("failed to begin transaction", e))?;

    let result = conn
        .execute_batch(migration.sql)
        .map_err(|e| fail("SQL execution failed", e))
        .and_then(|()| {
            conn.execute(
                "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![
                    migration.version,
                    migration.description,
                    chrono::Utc::now().timestamp()
                ],
            )
            .map(|_| ())
            .map_err(|e| fail("failed to record migration", e))
        });

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT;")
                .map_err(|e| fail("failed to commit", e))?;
            Ok(())
        }
        Err(err) => {
            warn!(version = migration.version, %err, "migration failed, rolling back");
            let _ = conn.execute_batch("ROLLBACK;");
            Err(err)
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
