//! Subcommand: `authbot run` -- web server plus Telegram bot.
//!
//! The web server serves the sign-in redirect and the OAuth callback; the
//! Telegram loop long-polls for messages and feeds them into the
//! conversation engine. Login events from the callback reach the engine
//! over the event bus.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use authbot_auth_engine::OidcClient;
use authbot_channels::TelegramChannel;
use authbot_core::{
    AuthBotConfig, ConversationEngine, LoginCallback, LoginDialog, LoginEventBus, spawn_sweeper,
    sweep_interval,
};
use authbot_store::{BotStateStore, SessionTokenStore, SqliteSessionTokenStore};
use authbot_web::{AppState, WebConfig, WebServer};

use crate::helpers::{init_tracing, open_database, pending_registry};

/// Pause after a failed `getUpdates` before polling again.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Run the bot until Ctrl+C.
pub async fn cmd_run(config_path: &Path, json_logs: bool) -> Result<()> {
    init_tracing("info", json_logs);
    info!("starting AuthBot");

    let config = AuthBotConfig::load_from(config_path).context("failed to load configuration")?;
    let bot_token = config.telegram_bot_token.clone().context(
        "TELEGRAM_BOT_TOKEN is required. Create a bot at https://t.me/BotFather",
    )?;

    let db = open_database(&config.db_path).await?;
    let registry = pending_registry(&config, &db);
    let sessions: Arc<dyn SessionTokenStore> = Arc::new(SqliteSessionTokenStore::new(db.clone()));
    let bot_state = BotStateStore::new(db);

    let oidc = Arc::new(
        OidcClient::discover(config.oidc.clone())
            .await
            .context("OpenID discovery failed")?,
    );

    let telegram = Arc::new(TelegramChannel::new(bot_token));
    let bot_name = telegram
        .get_me()
        .await
        .context("failed to reach Telegram API")?;

    let bus = LoginEventBus::default();
    let callback = Arc::new(LoginCallback::new(
        oidc.clone(),
        Arc::clone(&registry),
        bus.clone(),
    ));
    let dialog = LoginDialog::new(
        sessions,
        Arc::clone(&registry),
        oidc,
        config.callback_host.clone(),
    )
    .with_max_code_attempts(config.max_code_attempts);
    let engine = Arc::new(ConversationEngine::new(dialog).with_channel(telegram.clone()));

    let listener = engine.spawn_event_listener(&bus);
    let sweeper = spawn_sweeper(Arc::clone(&registry), sweep_interval(registry.as_ref()));
    let janitor = engine.spawn_janitor(config.code_ttl);

    let web = WebServer::new(
        WebConfig {
            bind_addr: config.bind_addr.clone(),
            port: config.port,
        },
        AppState::new(callback, Arc::clone(&registry)),
    );
    let web_addr = web.addr();
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::watch::channel(false);
    let mut web_task = tokio::spawn(web.start(async move {
        let _ = shutdown_rx.changed().await;
    }));

    println!();
    println!("  AuthBot v{}", env!("CARGO_PKG_VERSION"));
    println!("  Bot: @{bot_name}");
    println!("  Listening on: http://{web_addr}");
    println!("  Callback URL: {}", config.oidc.redirect_uri);
    println!("  Pending logins: {}", config.pending_backend);
    println!("  Long-poll timeout: {}s", config.poll_timeout_secs);
    println!();
    println!("  Press Ctrl+C to stop.");
    println!();

    let outcome = tokio::select! {
        () = poll_loop(&telegram, &engine, &bot_state, config.poll_timeout_secs) => Ok(()),
        joined = &mut web_task => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(anyhow::Error::new(e).context("web server failed")),
            Err(e) => Err(anyhow::Error::new(e).context("web server task panicked")),
        },
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            Ok(())
        }
    };

    let _ = shutdown_tx.send(true);
    listener.abort();
    sweeper.abort();
    janitor.abort();
    if !web_task.is_finished()
        && let Err(e) = web_task.await
    {
        warn!(error = %e, "web server did not stop cleanly");
    }

    info!("AuthBot stopped");
    outcome
}

/// Long-poll Telegram forever, persisting the offset after each batch.
///
/// Batches are handed to the engine's conversation queues, so the next poll
/// starts without waiting for any reply to go out.
async fn poll_loop(
    telegram: &TelegramChannel,
    engine: &Arc<ConversationEngine>,
    bot_state: &BotStateStore,
    timeout_secs: u64,
) {
    let mut offset = match bot_state.telegram_offset().await {
        Ok(Some(offset)) => {
            info!(offset, "restored Telegram polling offset from database");
            offset
        }
        Ok(None) => 0,
        Err(e) => {
            warn!(error = %e, "could not read Telegram offset, starting from 0");
            0
        }
    };

    loop {
        let batch = match telegram.poll_updates(offset, timeout_secs).await {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "Telegram poll failed, retrying");
                tokio::time::sleep(POLL_RETRY_DELAY).await;
                continue;
            }
        };

        if !batch.messages.is_empty() {
            debug!(count = batch.messages.len(), "dispatching Telegram batch");
            engine.dispatch(batch.messages);
        }

        if let Some(next) = batch.next_offset {
            offset = next;
            // Persist so a restart does not replay queued messages.
            if let Err(e) = bot_state.set_telegram_offset(next).await {
                warn!(error = %e, offset, "failed to persist Telegram offset");
            }
        }
    }
}
