//! Reminder/expiry runtime.
//!
//! A single background loop sweeps the session store once a minute:
//! unanswered messages older than the reminder age nudge the admin
//! channel (fire-once), live sessions older than the auto-close age are
//! ended with both sides notified. Sends happen after the claims, so
//! nothing blocks inside a store guard and a failed delivery only ever
//! skips its own entry.

use crate::session::SessionStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use desk_channels::{ChatTransport, OutboundMessage, UserId};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const SWEEP_INTERVAL_SECONDS: u64 = 60;
const REMINDER_AFTER_MINUTES: i64 = 2;
const AUTO_CLOSE_AFTER_MINUTES: i64 = 10;

const AUTO_CLOSE_USER_NOTICE: &str =
    "Your support session was closed due to inactivity. Send a new message any time to reach support again.";

#[derive(Debug, Clone, Default)]
pub struct ReminderStatus {
    pub sweeps: u64,
    pub last_sweep_at: Option<DateTime<Utc>>,
    pub reminders_sent: u64,
    pub sessions_closed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    pub reminded: Vec<UserId>,
    pub closed: Vec<UserId>,
}

/// One sweep over the store. Claims are atomic: entries mutated by the
/// gateway between snapshot and claim are skipped, and a claimed entry
/// cannot come due twice.
pub fn run_sweep(store: &SessionStore, now: DateTime<Utc>) -> SweepOutcome {
    let reminded = store.claim_due_reminders(now, ChronoDuration::minutes(REMINDER_AFTER_MINUTES));
    let closed = store.claim_expired_live(now, ChronoDuration::minutes(AUTO_CLOSE_AFTER_MINUTES));
    SweepOutcome { reminded, closed }
}

pub async fn notify_sweep_outcome(transport: &dyn ChatTransport, outcome: &SweepOutcome) {
    for user_id in &outcome.reminded {
        if let Err(error) = transport
            .send_to_admin(OutboundMessage::plain(format_reminder(user_id)))
            .await
        {
            tracing::warn!(%error, user = %user_id, "reminder notification failed; skipping entry");
        }
    }
    for user_id in &outcome.closed {
        if let Err(error) = transport
            .send_to_user(user_id, OutboundMessage::plain(AUTO_CLOSE_USER_NOTICE))
            .await
        {
            tracing::warn!(%error, user = %user_id, "auto-close user notification failed");
        }
        if let Err(error) = transport
            .send_to_admin(OutboundMessage::plain(format_auto_close(user_id)))
            .await
        {
            tracing::warn!(%error, user = %user_id, "auto-close admin notification failed");
        }
    }
}

fn format_reminder(user_id: &UserId) -> String {
    format!("⏰ Reminder: You have an unread message from user {user_id} pending response.")
}

fn format_auto_close(user_id: &UserId) -> String {
    format!(
        "🔕 Closed the live session with user {user_id} after {AUTO_CLOSE_AFTER_MINUTES} minutes of inactivity."
    )
}

pub struct ReminderRuntime {
    store: Arc<SessionStore>,
    transport: Arc<dyn ChatTransport>,
    state: Arc<RwLock<ReminderStatus>>,
    shutdown: CancellationToken,
    task_handle: Mutex<Option<JoinHandle<()>>>,
}

impl ReminderRuntime {
    pub fn new(store: Arc<SessionStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            store,
            transport,
            state: Arc::new(RwLock::new(ReminderStatus::default())),
            shutdown: CancellationToken::new(),
            task_handle: Mutex::new(None),
        }
    }

    pub async fn start(&self) {
        let mut task_handle = self.task_handle.lock().await;
        if task_handle.is_some() {
            return;
        }

        let store = Arc::clone(&self.store);
        let transport = Arc::clone(&self.transport);
        let state = Arc::clone(&self.state);
        let shutdown = self.shutdown.clone();
        *task_handle = Some(tokio::spawn(async move {
            run_sweep_loop(store, transport, state, shutdown).await;
        }));
    }

    pub async fn status_snapshot(&self) -> ReminderStatus {
        self.state.read().await.clone()
    }

    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.task_handle.lock().await.take();
        if let Some(handle) = handle {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "reminder sweep task join failed");
                }
                Err(_) => {
                    tracing::warn!("timed out waiting for reminder sweep task shutdown");
                }
            }
        }
    }
}

async fn run_sweep_loop(
    store: Arc<SessionStore>,
    transport: Arc<dyn ChatTransport>,
    state: Arc<RwLock<ReminderStatus>>,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECONDS));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                let outcome = run_sweep(&store, now);
                if !outcome.reminded.is_empty() || !outcome.closed.is_empty() {
                    tracing::info!(
                        reminded = outcome.reminded.len(),
                        closed = outcome.closed.len(),
                        "sweep claimed stale sessions"
                    );
                }
                notify_sweep_outcome(transport.as_ref(), &outcome).await;

                let mut guard = state.write().await;
                guard.sweeps += 1;
                guard.last_sweep_at = Some(now);
                guard.reminders_sent += outcome.reminded.len() as u64;
                guard.sessions_closed += outcome.closed.len() as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{notify_sweep_outcome, run_sweep};
    use crate::session::SessionStore;
    use crate::testing::{RecordingTransport, Sent};
    use chrono::{Duration, Utc};
    use desk_channels::UserId;

    fn user(id: &str) -> UserId {
        UserId::new(id)
    }

    #[tokio::test]
    async fn stale_pending_reminds_exactly_once() {
        let store = SessionStore::new();
        let transport = RecordingTransport::new();
        let now = Utc::now();
        store.start_live(&user("u1"), now - Duration::minutes(3));
        store.record_pending(&user("u1"), now - Duration::minutes(3));

        let outcome = run_sweep(&store, now);
        assert_eq!(outcome.reminded, vec![user("u1")]);
        assert!(outcome.closed.is_empty());
        notify_sweep_outcome(&transport, &outcome).await;

        let admin = transport.admin_messages();
        assert_eq!(admin.len(), 1);
        assert!(admin[0].contains("unread message from user u1"));
        assert!(store.get_or_create(&user("u1")).pending_since.is_none());

        // An immediate second sweep claims and sends nothing.
        let outcome = run_sweep(&store, now);
        assert_eq!(outcome, Default::default());
    }

    #[tokio::test]
    async fn fresh_pending_is_left_alone() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.start_live(&user("u1"), now - Duration::minutes(1));
        store.record_pending(&user("u1"), now - Duration::minutes(1));

        let outcome = run_sweep(&store, now);
        assert_eq!(outcome, Default::default());
        assert!(store.get_or_create(&user("u1")).pending_since.is_some());
    }

    #[tokio::test]
    async fn stale_live_session_closes_with_one_notification_per_side() {
        let store = SessionStore::new();
        let transport = RecordingTransport::new();
        let now = Utc::now();
        store.start_live(&user("u1"), now - Duration::minutes(11));

        let outcome = run_sweep(&store, now);
        assert_eq!(outcome.closed, vec![user("u1")]);
        notify_sweep_outcome(&transport, &outcome).await;

        let sent = transport.sent();
        assert_eq!(sent.len(), 2);
        assert!(matches!(
            &sent[0],
            Sent::ToUser { user_id, content, .. }
                if user_id == &user("u1") && content.contains("closed due to inactivity")
        ));
        assert!(matches!(
            &sent[1],
            Sent::ToAdmin { content, .. } if content.contains("user u1")
        ));
        assert!(!store.get_or_create(&user("u1")).live_active);
    }

    #[tokio::test]
    async fn nine_minute_live_session_survives_the_sweep() {
        let store = SessionStore::new();
        let now = Utc::now();
        store.start_live(&user("u1"), now - Duration::minutes(9));

        let outcome = run_sweep(&store, now);
        assert_eq!(outcome, Default::default());
        assert!(store.get_or_create(&user("u1")).live_active);
    }

    #[tokio::test]
    async fn reminder_claims_run_before_close_claims() {
        // A session both stale-pending and stale-live gets the reminder
        // and the close in the same sweep.
        let store = SessionStore::new();
        let now = Utc::now();
        store.start_live(&user("u1"), now - Duration::minutes(11));
        store.record_pending(&user("u1"), now - Duration::minutes(11));

        let outcome = run_sweep(&store, now);
        assert_eq!(outcome.reminded, vec![user("u1")]);
        assert_eq!(outcome.closed, vec![user("u1")]);
    }
}
