//! Inbound dispatcher: every transport event lands on a single queue.
//!
//! The loop routes admin-channel events to command handling or the
//! broadcast relay, and user events to command handling or the triage
//! policy. A single event's failure is logged, never fatal to the loop.

use crate::commands::{self, Command, CommandError};
use crate::relay;
use crate::session::SessionStore;
use crate::triage::{TriageAction, TriagePolicy};
use anyhow::Result;
use chrono::Utc;
use desk_channels::{ChatTransport, InboundEvent, OutboundMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const PING_REPLY: &str = "✅ Bot is alive and responding.";
const USER_UNKNOWN_COMMAND_REPLY: &str = "Unknown command. Supported: /start /faq /ping";

pub struct Gateway {
    store: Arc<SessionStore>,
    policy: TriagePolicy,
    transport: Arc<dyn ChatTransport>,
    welcome_message: String,
    inbound_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<InboundEvent>>>,
}

impl Gateway {
    pub fn new(
        store: Arc<SessionStore>,
        policy: TriagePolicy,
        transport: Arc<dyn ChatTransport>,
        welcome_message: String,
        inbound_rx: mpsc::Receiver<InboundEvent>,
    ) -> Self {
        Self {
            store,
            policy,
            transport,
            welcome_message,
            inbound_rx: Arc::new(tokio::sync::Mutex::new(inbound_rx)),
        }
    }

    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_loop(shutdown).await;
        })
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn run_loop(&self, shutdown: CancellationToken) {
        loop {
            let event = {
                let mut rx = self.inbound_rx.lock().await;
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    event = rx.recv() => event,
                }
            };
            let Some(event) = event else {
                tracing::info!("inbound queue closed; gateway loop exiting");
                return;
            };

            if let Err(e) = self.handle_event(event).await {
                tracing::warn!(%e, "handle_event failed");
            }
        }
    }

    pub(crate) async fn handle_event(&self, event: InboundEvent) -> Result<()> {
        if event.is_admin_channel {
            self.handle_admin_event(event).await
        } else {
            self.handle_user_event(event).await
        }
    }

    async fn handle_admin_event(&self, event: InboundEvent) -> Result<()> {
        match commands::parse(&event.text) {
            Some(Ok(command)) => self.handle_admin_command(command).await,
            Some(Err(CommandError::MalformedArgs { usage })) => {
                self.transport
                    .send_to_admin(OutboundMessage::plain(usage))
                    .await?;
                Ok(())
            }
            None => {
                let targets = relay::broadcast_targets(&self.store);
                let reply = relay::format_admin_reply(&event.text);
                for target in &targets {
                    if let Err(error) = self
                        .transport
                        .send_to_user(target, OutboundMessage::plain(reply.clone()))
                        .await
                    {
                        tracing::warn!(%error, user = %target, "admin broadcast delivery failed");
                    }
                }
                tracing::info!(notified = targets.len(), "admin reply broadcast");
                Ok(())
            }
        }
    }

    async fn handle_admin_command(&self, command: Command) -> Result<()> {
        let reply = match command {
            Command::Start => self.welcome_message.clone(),
            Command::Faq => format!(
                "Here are the common FAQs users can ask about:\n\n{}",
                self.policy.catalog().question_list()
            ),
            Command::Ping => PING_REPLY.to_string(),
            Command::Chat(user_id) => {
                self.store.start_live(&user_id, Utc::now());
                tracing::info!(user = %user_id, "admin started live session");
                format!("Chat started with user {user_id}. Use /stopchat {user_id} to end it.")
            }
            Command::StopChat(user_id) => {
                self.store.end_live(&user_id);
                tracing::info!(user = %user_id, "admin ended live session");
                format!("Chat ended with user {user_id}.")
            }
            Command::Unknown(name) => {
                format!("Unknown command {name}. Supported: /start /faq /chat /stopchat /ping")
            }
        };
        self.transport
            .send_to_admin(OutboundMessage::plain(reply))
            .await?;
        Ok(())
    }

    async fn handle_user_event(&self, event: InboundEvent) -> Result<()> {
        match commands::parse(&event.text) {
            Some(Ok(Command::Start)) => {
                self.store.mark_seen(&event.user_id);
                self.transport
                    .send_to_user(
                        &event.user_id,
                        OutboundMessage::plain(self.welcome_message.clone()),
                    )
                    .await?;
            }
            Some(Ok(Command::Faq)) => {
                let reply = format!(
                    "Here are the common FAQs you can ask about:\n\n{}",
                    self.policy.catalog().question_list()
                );
                self.transport
                    .send_to_user(&event.user_id, OutboundMessage::plain(reply))
                    .await?;
            }
            Some(Ok(Command::Ping)) => {
                self.transport
                    .send_to_user(&event.user_id, OutboundMessage::plain(PING_REPLY))
                    .await?;
            }
            // /chat and /stopchat are admin-channel only.
            Some(Ok(Command::Chat(_) | Command::StopChat(_) | Command::Unknown(_)))
            | Some(Err(_)) => {
                self.transport
                    .send_to_user(
                        &event.user_id,
                        OutboundMessage::plain(USER_UNKNOWN_COMMAND_REPLY),
                    )
                    .await?;
            }
            None => return self.handle_user_text(event).await,
        }
        Ok(())
    }

    async fn handle_user_text(&self, event: InboundEvent) -> Result<()> {
        let outcome = self.policy.decide(
            &self.store,
            &event.user_id,
            &event.sender_display,
            &event.text,
            Utc::now(),
        );

        if outcome.send_welcome {
            self.transport
                .send_to_user(
                    &event.user_id,
                    OutboundMessage::plain(self.welcome_message.clone()),
                )
                .await?;
        }

        match outcome.action {
            TriageAction::AutoReply(answer) => {
                self.transport
                    .send_to_user(&event.user_id, OutboundMessage::formatted(answer))
                    .await?;
            }
            TriageAction::ForwardToAdmin(text) => {
                self.transport
                    .send_to_admin(OutboundMessage::plain(text))
                    .await?;
            }
            TriageAction::Escalate {
                user_notice,
                admin_notice,
            } => {
                self.transport
                    .send_to_user(&event.user_id, OutboundMessage::plain(user_notice))
                    .await?;
                self.transport
                    .send_to_admin(OutboundMessage::plain(admin_notice))
                    .await?;
            }
        }
        Ok(())
    }
}
