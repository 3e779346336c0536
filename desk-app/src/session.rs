//! Per-user triage state behind atomic named operations.
//!
//! The store is the only shared mutable resource in the relay: the
//! gateway mutates it on every inbound event and the reminder runtime
//! sweeps it on an interval. Sweeps operate on point-in-time snapshots
//! and re-check the stored timestamp before claiming an entry, so an
//! entry mutated mid-sweep is never reprocessed.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use desk_channels::UserId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSession {
    /// True once any inbound message from this user has been processed.
    pub seen: bool,
    /// True while the user is paired with the admin channel.
    pub live_active: bool,
    /// Set iff `live_active`.
    pub live_since: Option<DateTime<Utc>>,
    /// Oldest unanswered inbound message, first-unanswered semantics.
    pub pending_since: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<UserId, UserSession>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a user's session, creating the default lazily.
    pub fn get_or_create(&self, user_id: &UserId) -> UserSession {
        self.sessions.entry(user_id.clone()).or_default().clone()
    }

    /// Marks the user seen. Returns true when this was first contact.
    pub fn mark_seen(&self, user_id: &UserId) -> bool {
        let mut session = self.sessions.entry(user_id.clone()).or_default();
        let first_contact = !session.seen;
        session.seen = true;
        first_contact
    }

    pub fn start_live(&self, user_id: &UserId, now: DateTime<Utc>) {
        let mut session = self.sessions.entry(user_id.clone()).or_default();
        if !session.live_active {
            session.live_active = true;
            session.live_since = Some(now);
        }
    }

    /// Ends the live session, clearing pending state with it. Returns
    /// whether a live session was actually ended.
    pub fn end_live(&self, user_id: &UserId) -> bool {
        let mut session = self.sessions.entry(user_id.clone()).or_default();
        let was_live = session.live_active;
        session.live_active = false;
        session.live_since = None;
        session.pending_since = None;
        was_live
    }

    /// Records the oldest-unanswered timestamp; no-op while one is set.
    pub fn record_pending(&self, user_id: &UserId, now: DateTime<Utc>) {
        let mut session = self.sessions.entry(user_id.clone()).or_default();
        if session.pending_since.is_none() {
            session.pending_since = Some(now);
        }
    }

    /// Returns whether a pending timestamp was actually cleared.
    pub fn clear_pending(&self, user_id: &UserId) -> bool {
        let mut session = self.sessions.entry(user_id.clone()).or_default();
        session.pending_since.take().is_some()
    }

    pub fn live_users(&self) -> Vec<UserId> {
        self.sessions
            .iter()
            .filter(|entry| entry.value().live_active)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Point-in-time copy of (user, live_since) pairs. Scheduler use only.
    pub fn live_snapshot(&self) -> Vec<(UserId, DateTime<Utc>)> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                let session = entry.value();
                match (session.live_active, session.live_since) {
                    (true, Some(since)) => Some((entry.key().clone(), since)),
                    _ => None,
                }
            })
            .collect()
    }

    /// Point-in-time copy of (user, pending_since) pairs. Scheduler use only.
    pub fn pending_snapshot(&self) -> Vec<(UserId, DateTime<Utc>)> {
        self.sessions
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .pending_since
                    .map(|since| (entry.key().clone(), since))
            })
            .collect()
    }

    /// Atomically clears pending state older than `min_age` and returns
    /// the claimed users. Fire-once: a claimed entry will not come due
    /// again until a new message re-arms it.
    pub fn claim_due_reminders(&self, now: DateTime<Utc>, min_age: Duration) -> Vec<UserId> {
        let due: Vec<(UserId, DateTime<Utc>)> = self
            .pending_snapshot()
            .into_iter()
            .filter(|(_, since)| now.signed_duration_since(*since) > min_age)
            .collect();

        let mut claimed = Vec::new();
        for (user_id, since) in due {
            let mut session = self.sessions.entry(user_id.clone()).or_default();
            if session.pending_since == Some(since) {
                session.pending_since = None;
                drop(session);
                claimed.push(user_id);
            }
        }
        claimed
    }

    /// Atomically ends live sessions older than `max_age` and returns
    /// the claimed users.
    pub fn claim_expired_live(&self, now: DateTime<Utc>, max_age: Duration) -> Vec<UserId> {
        let expired: Vec<(UserId, DateTime<Utc>)> = self
            .live_snapshot()
            .into_iter()
            .filter(|(_, since)| now.signed_duration_since(*since) > max_age)
            .collect();

        let mut claimed = Vec::new();
        for (user_id, since) in expired {
            let mut session = self.sessions.entry(user_id.clone()).or_default();
            if session.live_active && session.live_since == Some(since) {
                session.live_active = false;
                session.live_since = None;
                session.pending_since = None;
                drop(session);
                claimed.push(user_id);
            }
        }
        claimed
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
