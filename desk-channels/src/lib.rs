//! Chat transport layer for RelayDesk.
//!
//! Transports are pure I/O: they convert platform messages to/from the
//! relay's `InboundEvent` / `OutboundMessage` and expose the admin
//! channel as a distinct send target.

mod error;
mod telegram;
mod traits;
mod types;

pub use error::{DeliveryError, Result};
pub use telegram::TelegramTransport;
pub use traits::ChatTransport;
pub use types::{CommandSpec, InboundEvent, MessageId, OutboundMessage, UserId};
