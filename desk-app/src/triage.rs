//! Escalation decision procedure for inbound user messages.
//!
//! Pure decision plus store transitions; all outbound sends happen in
//! the gateway, after the store mutation completes.

use crate::faq::FaqCatalog;
use crate::session::SessionStore;
use chrono::{DateTime, Utc};
use desk_channels::UserId;

#[derive(Debug, Clone, PartialEq)]
pub enum TriageAction {
    /// Canned FAQ answer back to the user; no state change.
    AutoReply(String),
    /// Live session active: the annotated raw text goes to the admin
    /// channel, FAQ matching skipped.
    ForwardToAdmin(String),
    /// No match: the user enters a live session; both sides are told.
    Escalate {
        user_notice: String,
        admin_notice: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct TriageOutcome {
    /// True on the user's first-ever message. The welcome is a side
    /// send; it never short-circuits the action below.
    pub send_welcome: bool,
    pub action: TriageAction,
}

pub struct TriagePolicy {
    catalog: FaqCatalog,
    fallback_message: String,
}

impl TriagePolicy {
    pub fn new(catalog: FaqCatalog, fallback_message: impl Into<String>) -> Self {
        Self {
            catalog,
            fallback_message: fallback_message.into(),
        }
    }

    pub fn catalog(&self) -> &FaqCatalog {
        &self.catalog
    }

    pub fn decide(
        &self,
        store: &SessionStore,
        user_id: &UserId,
        sender_display: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> TriageOutcome {
        let send_welcome = store.mark_seen(user_id);

        if store.get_or_create(user_id).live_active {
            store.record_pending(user_id, now);
            return TriageOutcome {
                send_welcome,
                action: TriageAction::ForwardToAdmin(format_forward(sender_display, text)),
            };
        }

        if let Some(entry) = self.catalog.best_match(text) {
            return TriageOutcome {
                send_welcome,
                action: TriageAction::AutoReply(entry.answer.clone()),
            };
        }

        // The safety net: an unmatched message is never silently dropped.
        store.start_live(user_id, now);
        store.record_pending(user_id, now);
        TriageOutcome {
            send_welcome,
            action: TriageAction::Escalate {
                user_notice: self.fallback_message.clone(),
                admin_notice: format_escalation(user_id, sender_display, text),
            },
        }
    }
}

fn format_forward(sender_display: &str, text: &str) -> String {
    format!("📨 Message from @{sender_display}:\n{text}")
}

fn format_escalation(user_id: &UserId, sender_display: &str, text: &str) -> String {
    format!(
        "🚨 User @{sender_display} needs help:\n{text}\n\nUse /chat {user_id} to begin chatting."
    )
}
