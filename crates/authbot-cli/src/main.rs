//! CLI entry point for AuthBot.
//!
//! This binary provides the `authbot` command with subcommands for running
//! the bot, checking its status and purging expired pending logins.

mod bot;
mod cli;
mod helpers;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use authbot_core::AuthBotConfig;
use authbot_store::{BotStateStore, PendingLoginRegistry, SqlitePendingLogins};

use crate::cli::{Cli, Commands};
use crate::helpers::{init_tracing, open_database};

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { json } => bot::cmd_run(&cli.config, json).await,
        Commands::Status => cmd_status(&cli.config).await,
        Commands::Sweep => cmd_sweep(&cli.config).await,
    }
}

// ---------------------------------------------------------------------------
// Subcommand: status
// ---------------------------------------------------------------------------

async fn cmd_status(config_path: &Path) -> Result<()> {
    init_tracing("warn", false);

    println!();
    println!("  AuthBot Status");
    println!("  ==============");
    println!();

    if config_path.exists() {
        println!("  Config file:      OK ({})", config_path.display());
    } else {
        println!("  Config file:      MISSING (environment only)");
    }

    let config = match AuthBotConfig::load_from(config_path) {
        Ok(config) => config,
        Err(e) => {
            println!("  Configuration:    INVALID ({e})");
            println!();
            return Ok(());
        }
    };
    println!("  Configuration:    OK");
    println!("  Callback URL:     {}", config.oidc.redirect_uri);
    println!("  Listen address:   {}", config.listen_addr());
    match config.telegram_bot_token {
        Some(_) => println!("  Telegram bot:     CONFIGURED"),
        None => println!("  Telegram bot:     NOT SET"),
    }
    println!("  Pending backend:  {}", config.pending_backend);

    if config.db_path.exists() {
        let db = open_database(&config.db_path).await?;
        println!("  Database:         OK ({})", config.db_path.display());

        let durable = SqlitePendingLogins::new(db.clone(), config.code_ttl);
        println!("  Durable pending:  {}", durable.len().await?);

        match BotStateStore::new(db).telegram_offset().await? {
            Some(offset) => println!("  Telegram offset:  {offset}"),
            None => println!("  Telegram offset:  none"),
        }
    } else {
        println!("  Database:         NOT INITIALIZED (created by `authbot run`)");
    }

    println!();
    Ok(())
}

// ---------------------------------------------------------------------------
// Subcommand: sweep
// ---------------------------------------------------------------------------

async fn cmd_sweep(config_path: &Path) -> Result<()> {
    init_tracing("info", false);

    let config = AuthBotConfig::load_from(config_path).context("failed to load configuration")?;
    if !config.db_path.exists() {
        println!("  No database at {}; nothing to sweep.", config.db_path.display());
        return Ok(());
    }

    let db = open_database(&config.db_path).await?;
    let dropped = SqlitePendingLogins::new(db, config.code_ttl)
        .sweep()
        .await
        .context("failed to sweep pending logins")?;

    println!("  Purged {dropped} expired pending login(s).");
    Ok(())
}
