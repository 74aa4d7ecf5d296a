//! # authbot-channels
//!
//! Chat transports for AuthBot. A channel delivers [`Outgoing`] messages to
//! a [`ConversationAddress`] and, for polling platforms, yields
//! [`InboundMessage`]s.
//!
//! - [`TelegramChannel`]: Telegram Bot API (`sendMessage`, `getUpdates`)
//! - [`RecordingChannel`]: in-memory recorder for tests

pub mod address;
pub mod error;
pub mod recording;
pub mod telegram;
pub mod traits;

pub use address::{AddressError, ConversationAddress};
pub use error::{ChannelError, Result};
pub use recording::{RecordingChannel, SentMessage};
pub use telegram::{TELEGRAM_CHANNEL_ID, TelegramChannel, UpdateBatch};
pub use traits::{ChatChannel, InboundMessage, Outgoing};
