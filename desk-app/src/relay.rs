//! Admin-reply broadcast.
//!
//! One admin message touches every open live session at once; there is
//! no per-user targeting. The returned set is what the gateway delivers
//! to (and what tests and logs observe).

use crate::session::SessionStore;
use desk_channels::UserId;

pub fn format_admin_reply(text: &str) -> String {
    format!("Support: {text}")
}

/// Collects every live user and clears their pending state. Delivery
/// happens in the caller, outside any store guard.
pub fn broadcast_targets(store: &SessionStore) -> Vec<UserId> {
    let targets = store.live_users();
    for target in &targets {
        store.clear_pending(target);
    }
    targets
}
