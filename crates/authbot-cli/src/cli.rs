//! CLI argument definitions for AuthBot.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// AuthBot -- chat sign-in through a browser and a one-time code.
#[derive(Parser)]
#[command(
    name = "authbot",
    version,
    about = "AuthBot -- OpenID Connect sign-in for chat bots",
    long_about = "Links a chat conversation to an OpenID Connect login: the user signs in \
                  in the browser, receives a magic code and types it back into the chat."
)]
pub struct Cli {
    /// Settings file with an `[authbot]` table.
    #[arg(long, global = true, default_value = authbot_core::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the web server and the Telegram bot.
    Run {
        /// Emit logs as JSON lines.
        #[arg(long)]
        json: bool,
    },

    /// Show configuration and database status.
    Status,

    /// Purge expired pending logins from the database.
    Sweep,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_run_with_json() {
        let cli = Cli::parse_from(["authbot", "run", "--json"]);
        assert!(matches!(cli.command, Commands::Run { json: true }));
        assert_eq!(cli.config, PathBuf::from("config/default.toml"));
    }

    #[test]
    fn config_flag_is_global() {
        let cli = Cli::parse_from(["authbot", "sweep", "--config", "/etc/authbot.toml"]);
        assert!(matches!(cli.command, Commands::Sweep));
        assert_eq!(cli.config, PathBuf::from("/etc/authbot.toml"));
    }
}
