//! In-memory channel that records every message it is asked to send.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::address::ConversationAddress;
use crate::error::Result;
use crate::traits::{ChatChannel, Outgoing};

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub address: ConversationAddress,
    pub message: Outgoing,
}

/// [`ChatChannel`] that keeps sent messages in memory.
pub struct RecordingChannel {
    id: String,
    sent: Mutex<Vec<SentMessage>>,
    notify: Notify,
}

impl RecordingChannel {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sent: Mutex::new(Vec::new()),
            notify: Notify::new(),
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }

    /// Messages sent to one conversation, in order.
    pub fn sent_to(&self, conversation_key: &str) -> Vec<Outgoing> {
        self.sent()
            .into_iter()
            .filter(|m| m.address.conversation_key() == conversation_key)
            .map(|m| m.message)
            .collect()
    }

    /// Wait until at least `count` messages went to `conversation_key`.
    ///
    /// Returns what was sent to that conversation, or `None` on timeout.
    pub async fn wait_for(
        &self,
        conversation_key: &str,
        count: usize,
        timeout: Duration,
    ) -> Option<Vec<Outgoing>> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                let sent = self.sent_to(conversation_key);
                if sent.len() >= count {
                    return sent;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.ok()
    }

    pub fn clear(&self) {
        if let Ok(mut sent) = self.sent.lock() {
            sent.clear();
        }
    }
}

#[async_trait]
impl ChatChannel for RecordingChannel {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send(&self, address: &ConversationAddress, message: Outgoing) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentMessage {
                address: address.clone(),
                message,
            });
        }
        self.notify.notify_waiters();
        Ok(())
    }
}
