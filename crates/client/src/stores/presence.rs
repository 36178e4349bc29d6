//! Presence store: online flags for every user an indicator is bound to.

use std::collections::HashMap;

use dioxus::prelude::*;
use forumsync_shared::UserId;

/// Online flag by user id, as last pushed by `user_online` / `user_offline`.
pub static PRESENCE: GlobalSignal<HashMap<UserId, bool>> = Signal::global(HashMap::new);

pub fn update_presence(user_id: UserId, online: bool) {
    PRESENCE.write().insert(user_id, online);
}

/// Users never reported are treated as offline.
pub fn is_online(user_id: UserId) -> bool {
    PRESENCE.read().get(&user_id).copied().unwrap_or(false)
}

pub fn clear_presence() {
    PRESENCE.write().clear();
}
