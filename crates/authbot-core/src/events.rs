//! Login event bus.
//!
//! The web callback publishes [`LoginEvent::LoginCompleted`] once a pending
//! login is stored; the conversation engine subscribes and resumes the
//! matching conversation. The event carries only the address, never the
//! magic code.
//!
//! Built on [`tokio::sync::broadcast`]. Events are wrapped in [`Arc`] so
//! every subscriber shares one allocation.

use std::sync::Arc;

use authbot_channels::ConversationAddress;
use tokio::sync::broadcast;

/// Default channel capacity for [`LoginEventBus::new`].
pub const DEFAULT_BUS_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginEvent {
    /// A browser sign-in finished for this conversation and its magic code
    /// is ready to be claimed.
    LoginCompleted { address: ConversationAddress },
}

/// Publish/subscribe bus for [`LoginEvent`]s. Cheap to clone.
#[derive(Clone)]
pub struct LoginEventBus {
    sender: broadcast::Sender<Arc<LoginEvent>>,
}

impl Default for LoginEventBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl LoginEventBus {
    /// A subscriber that falls more than `capacity` events behind sees
    /// [`broadcast::error::RecvError::Lagged`].
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to every current subscriber, returning how many there are.
    ///
    /// With no subscribers the event is dropped; the user can still type the
    /// code shown in the browser.
    pub fn publish(&self, event: LoginEvent) -> usize {
        match self.sender.send(Arc::new(event)) {
            Ok(n) => {
                tracing::trace!(receivers = n, "login event published");
                n
            }
            Err(_) => {
                tracing::debug!("login event published with no subscribers");
                0
            }
        }
    }

    /// Events published before this call are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<LoginEvent>> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(conversation: &str) -> LoginEvent {
        LoginEvent::LoginCompleted {
            address: ConversationAddress::new("test", conversation, "u"),
        }
    }

    #[tokio::test]
    async fn subscribers_share_the_event() {
        let bus = LoginEventBus::new(8);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.publish(completed("1")), 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert!(Arc::ptr_eq(&e1, &e2));
        assert_eq!(*e1, completed("1"));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_dropped() {
        let bus = LoginEventBus::new(8);
        assert_eq!(bus.publish(completed("1")), 0);
    }

    #[tokio::test]
    async fn late_subscriber_misses_earlier_events() {
        let bus = LoginEventBus::new(8);
        let _early = bus.subscribe();
        bus.publish(completed("1"));

        let mut late = bus.subscribe();
        bus.publish(completed("2"));
        assert_eq!(*late.recv().await.unwrap(), completed("2"));
    }

    #[test]
    fn subscriber_count_tracks_receivers() {
        let bus = LoginEventBus::default();
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
