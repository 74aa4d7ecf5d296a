//! Conversation engine.
//!
//! Routes inbound chat messages and [`LoginEvent`]s into the
//! [`LoginDialog`], keeps each conversation's [`DialogState`], and sends the
//! replies through the channel that owns the conversation.
//!
//! Each conversation sits behind its own `tokio::sync::Mutex`, so one
//! conversation handles one input at a time while different conversations
//! run in parallel. Polled messages are queued on a per-conversation inbox
//! whose worker handles them in arrival order; the poller never waits on a
//! conversation.
//!
//! A conversation whose dialog ends back at `NotLoggedIn` is forgotten at
//! once. Other states are dropped by [`ConversationEngine::evict_idle`] once
//! nobody has spoken for a while.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use authbot_channels::{ChatChannel, ChannelError, ConversationAddress, InboundMessage, Outgoing};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dialog::{DialogInput, DialogState, LoginDialog};
use crate::error::{LoginError, LoginResult};
use crate::events::{LoginEvent, LoginEventBus};

/// Sent when a step fails on an infrastructure error.
pub const INTERNAL_ERROR: &str = "Something happened on my side. Please try again.";

/// How long a conversation inbox worker waits for input before retiring.
pub const DEFAULT_INBOX_IDLE: Duration = Duration::from_secs(60);

#[derive(Debug)]
struct Slot {
    state: DialogState,
    touched: Instant,
}

impl Default for Slot {
    fn default() -> Self {
        Self {
            state: DialogState::NotLoggedIn,
            touched: Instant::now(),
        }
    }
}

/// Drives every conversation's sign-in dialog.
pub struct ConversationEngine {
    dialog: LoginDialog,
    channels: HashMap<String, Arc<dyn ChatChannel>>,
    conversations: DashMap<String, Arc<Mutex<Slot>>>,
    inboxes: DashMap<String, mpsc::UnboundedSender<InboundMessage>>,
    inbox_idle: Duration,
}

impl ConversationEngine {
    pub fn new(dialog: LoginDialog) -> Self {
        Self {
            dialog,
            channels: HashMap::new(),
            conversations: DashMap::new(),
            inboxes: DashMap::new(),
            inbox_idle: DEFAULT_INBOX_IDLE,
        }
    }

    /// Register a channel; replies to addresses with its id go through it.
    pub fn with_channel(mut self, channel: Arc<dyn ChatChannel>) -> Self {
        self.channels.insert(channel.id().to_string(), channel);
        self
    }

    pub fn with_inbox_idle(mut self, idle: Duration) -> Self {
        self.inbox_idle = idle;
        self
    }

    /// Current dialog state of a conversation, if it has a live dialog.
    pub async fn state_of(&self, conversation_key: &str) -> Option<DialogState> {
        let slot = self
            .conversations
            .get(conversation_key)
            .map(|entry| Arc::clone(entry.value()))?;
        let state = slot.lock().await.state;
        Some(state)
    }

    /// Conversations with a live dialog.
    pub fn conversation_count(&self) -> usize {
        self.conversations.len()
    }

    /// Conversations with a running inbox worker.
    pub fn inbox_count(&self) -> usize {
        self.inboxes.len()
    }

    fn slot(&self, conversation_key: &str) -> Arc<Mutex<Slot>> {
        // Clone out of the map so no shard lock is held across an await.
        self.conversations
            .entry(conversation_key.to_string())
            .or_default()
            .clone()
    }

    /// Drop `conversation_key` if it is back at the start and nobody else
    /// holds its slot. The caller's own clone accounts for the second count.
    fn forget_if_finished(&self, conversation_key: &str) {
        let removed = self.conversations.remove_if(conversation_key, |_, slot| {
            Arc::strong_count(slot) <= 2
                && slot
                    .try_lock()
                    .is_ok_and(|slot| slot.state == DialogState::NotLoggedIn)
        });
        if removed.is_some() {
            debug!(conversation = %conversation_key, "conversation finished, slot dropped");
        }
    }

    /// Drop every unlocked conversation untouched for at least `idle`.
    /// Returns how many were dropped.
    pub fn evict_idle(&self, idle: Duration) -> usize {
        let mut evicted = 0;
        self.conversations.retain(|_, slot| {
            let keep = Arc::strong_count(slot) > 1
                || slot
                    .try_lock()
                    .map_or(true, |slot| slot.touched.elapsed() < idle);
            if !keep {
                evicted += 1;
            }
            keep
        });
        evicted
    }

    /// Run [`Self::evict_idle`] periodically until aborted.
    pub fn spawn_janitor(self: &Arc<Self>, idle: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let every = (idle / 2).max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let evicted = engine.evict_idle(idle);
                if evicted > 0 {
                    debug!(evicted, "idle conversations dropped");
                }
            }
        })
    }

    /// Process one user message.
    pub async fn handle_message(&self, message: &InboundMessage) -> LoginResult<()> {
        self.drive(&message.address, DialogInput::Message(&message.text))
            .await
    }

    /// Process one login event.
    pub async fn handle_event(&self, event: &LoginEvent) -> LoginResult<()> {
        match event {
            LoginEvent::LoginCompleted { address } => {
                self.drive(address, DialogInput::LoginCompleted).await
            }
        }
    }

    /// Queue a batch from a polling channel and return without waiting.
    ///
    /// Messages of one conversation are handled in arrival order, across
    /// batches too; different conversations are handled concurrently.
    pub fn dispatch(self: &Arc<Self>, messages: Vec<InboundMessage>) {
        for message in messages {
            self.enqueue(message);
        }
    }

    fn enqueue(self: &Arc<Self>, message: InboundMessage) {
        let key = message.address.conversation_key();
        // The send happens under the entry's shard lock, which is what an
        // idle worker takes before it retires.
        let mut inbox = self
            .inboxes
            .entry(key.clone())
            .or_insert_with(|| self.spawn_inbox(&key));
        if let Err(mpsc::error::SendError(message)) = inbox.send(message) {
            warn!(conversation = %key, "conversation worker gone, restarting it");
            *inbox = self.spawn_inbox(&key);
            if inbox.send(message).is_err() {
                error!(conversation = %key, "dropping message, worker did not start");
            }
        }
    }

    fn spawn_inbox(self: &Arc<Self>, key: &str) -> mpsc::UnboundedSender<InboundMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(self).run_inbox(key.to_string(), rx));
        tx
    }

    async fn run_inbox(
        self: Arc<Self>,
        key: String,
        mut inbox: mpsc::UnboundedReceiver<InboundMessage>,
    ) {
        loop {
            match tokio::time::timeout(self.inbox_idle, inbox.recv()).await {
                Ok(Some(message)) => {
                    if let Err(e) = self.handle_message(&message).await {
                        error!(conversation = %key, error = %e, "failed to handle message");
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    if self
                        .inboxes
                        .remove_if(&key, |_, _| inbox.is_empty())
                        .is_some()
                    {
                        break;
                    }
                }
            }
        }
        debug!(conversation = %key, "conversation worker retired");
    }

    /// Subscribe to `bus` and feed every event into the engine.
    ///
    /// Each event runs on its own task so a slow conversation never delays
    /// another. The listener ends when the bus is dropped.
    pub fn spawn_event_listener(self: &Arc<Self>, bus: &LoginEventBus) -> JoinHandle<()> {
        let mut events = bus.subscribe();
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let engine = Arc::clone(&engine);
                        tokio::spawn(async move {
                            if let Err(e) = engine.handle_event(&event).await {
                                error!(error = %e, "failed to handle login event");
                            }
                        });
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Users can still type their codes; only the prompt is lost.
                        warn!(missed, "login event listener lagged");
                    }
                    Err(RecvError::Closed) => {
                        info!("login event bus closed, listener stopping");
                        break;
                    }
                }
            }
        })
    }

    async fn drive(&self, address: &ConversationAddress, input: DialogInput<'_>) -> LoginResult<()> {
        let key = address.conversation_key();
        let slot = self.slot(&key);
        let mut current = slot.lock().await;

        let (next, replies) = match self.dialog.step(address, current.state, input).await {
            Ok(turn) => (turn.state, turn.replies),
            Err(e) => {
                error!(conversation = %key, error = %e, "dialog step failed, resetting");
                (DialogState::NotLoggedIn, vec![Outgoing::text(INTERNAL_ERROR)])
            }
        };
        debug!(conversation = %key, from = ?current.state, to = ?next, "dialog transition");
        current.state = next;
        current.touched = Instant::now();

        // Replies go out while the conversation is still locked so they
        // cannot interleave with the next turn's.
        let mut sent = Ok(());
        for reply in replies {
            if let Err(e) = self.send(address, reply).await {
                sent = Err(e);
                break;
            }
        }
        drop(current);

        if next == DialogState::NotLoggedIn {
            self.forget_if_finished(&key);
        }
        sent
    }

    async fn send(&self, address: &ConversationAddress, message: Outgoing) -> LoginResult<()> {
        let channel = self.channels.get(&address.channel_id).ok_or_else(|| {
            LoginError::Channel(ChannelError::Unroutable {
                channel: address.channel_id.clone(),
                reason: "no channel registered".into(),
            })
        })?;
        channel.send(address, message).await?;
        Ok(())
    }
}

// ── tests ────────────────────────────────────────────────────────────
