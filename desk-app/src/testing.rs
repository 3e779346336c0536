//! Shared test doubles.

use async_trait::async_trait;
use desk_channels::{ChatTransport, InboundEvent, OutboundMessage, Result, UserId};
use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sent {
    ToUser {
        user_id: UserId,
        content: String,
        formatted: bool,
    },
    ToAdmin {
        content: String,
        formatted: bool,
    },
}

/// In-memory transport that records every outbound send.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn user_messages(&self, user_id: &UserId) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::ToUser {
                    user_id: to,
                    content,
                    ..
                } if &to == user_id => Some(content),
                _ => None,
            })
            .collect()
    }

    pub fn admin_messages(&self) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter_map(|sent| match sent {
                Sent::ToAdmin { content, .. } => Some(content),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    fn transport_id(&self) -> &str {
        "recording"
    }

    async fn start(&self, _tx: mpsc::Sender<InboundEvent>) -> Result<()> {
        Ok(())
    }

    async fn send_to_user(&self, user_id: &UserId, message: OutboundMessage) -> Result<()> {
        self.sent.lock().expect("sent lock").push(Sent::ToUser {
            user_id: user_id.clone(),
            content: message.content,
            formatted: message.formatted,
        });
        Ok(())
    }

    async fn send_to_admin(&self, message: OutboundMessage) -> Result<()> {
        self.sent.lock().expect("sent lock").push(Sent::ToAdmin {
            content: message.content,
            formatted: message.formatted,
        });
        Ok(())
    }
}
