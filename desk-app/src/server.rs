//! RelayDesk server wiring.

use crate::commands;
use crate::config::RelayDeskConfig;
use crate::faq::FaqCatalog;
use crate::gateway::Gateway;
use crate::reminder::ReminderRuntime;
use crate::session::SessionStore;
use crate::triage::TriagePolicy;
use anyhow::Result;
use desk_channels::{ChatTransport, OutboundMessage, TelegramTransport, UserId};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayDeskConfig::load(config_path).await?;
    tracing::info!(
        admin_chat_id = cfg.telegram.admin_chat_id,
        faq_entries = cfg.support.faq.len(),
        "config ok"
    );
    Ok(())
}

pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    recipient: &str,
    message: &str,
) -> Result<()> {
    let cfg = RelayDeskConfig::load(config_path).await?;
    let transport = TelegramTransport::new(&cfg.telegram.bot_token, cfg.telegram.admin_chat_id)?;
    transport
        .send_to_user(&UserId::new(recipient), OutboundMessage::plain(message))
        .await?;
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let cfg = RelayDeskConfig::load(config_path).await?;
    tracing::info!(
        admin_chat_id = cfg.telegram.admin_chat_id,
        faq_entries = cfg.support.faq.len(),
        "server configuration loaded"
    );

    let transport: Arc<dyn ChatTransport> = Arc::new(TelegramTransport::new(
        &cfg.telegram.bot_token,
        cfg.telegram.admin_chat_id,
    )?);

    if let Err(error) = transport
        .register_commands(&commands::command_menu())
        .await
    {
        tracing::warn!(%error, "command menu registration failed; continuing without it");
    }

    let (inbound_tx, inbound_rx) = tokio::sync::mpsc::channel(1024);
    transport.start(inbound_tx).await?;

    let store = Arc::new(SessionStore::new());
    let policy = TriagePolicy::new(
        FaqCatalog::from_config(&cfg.support.faq),
        cfg.support.fallback_message.clone(),
    );
    let gateway = Arc::new(Gateway::new(
        store.clone(),
        policy,
        transport.clone(),
        cfg.support.welcome_message.clone(),
        inbound_rx,
    ));

    let shutdown = CancellationToken::new();
    let gateway_handle = gateway.start(shutdown.child_token());
    tracing::info!(transport = transport.transport_id(), "gateway started");

    let reminders = Arc::new(ReminderRuntime::new(store.clone(), transport.clone()));
    reminders.start().await;
    tracing::info!("reminder runtime started");

    shutdown_signal(shutdown.clone()).await;

    reminders.shutdown().await;
    let status = reminders.status_snapshot().await;
    tracing::info!(
        sweeps = status.sweeps,
        reminders_sent = status.reminders_sent,
        sessions_closed = status.sessions_closed,
        last_sweep_at = ?status.last_sweep_at,
        "reminder runtime stopped"
    );
    match gateway_handle.await {
        Ok(()) => tracing::info!("gateway shutdown completed"),
        Err(e) => tracing::error!(error = %e, "gateway task join failed during shutdown"),
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; beginning graceful shutdown");
        }
    }
    shutdown.cancel();
}
