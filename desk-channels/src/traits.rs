use crate::error::Result;
use crate::types::{CommandSpec, InboundEvent, OutboundMessage, UserId};
use async_trait::async_trait;
use tokio::sync::mpsc;

#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Unique transport identifier: "telegram".
    fn transport_id(&self) -> &str;

    /// Start receiving messages. Push to tx for each inbound event.
    async fn start(&self, tx: mpsc::Sender<InboundEvent>) -> Result<()>;

    /// Send a message to a specific user.
    async fn send_to_user(&self, user_id: &UserId, message: OutboundMessage) -> Result<()>;

    /// Send a message to the shared admin channel.
    async fn send_to_admin(&self, message: OutboundMessage) -> Result<()>;

    /// Register the platform command menu. Transports without a command
    /// menu should keep the default.
    async fn register_commands(&self, _commands: &[CommandSpec]) -> Result<()> {
        Ok(())
    }
}
