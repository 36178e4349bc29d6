//! Global stores for application state.
//!
//! `DioxusView` is the `ViewPort` for Dioxus front ends: every view update
//! lands in one of these signals and components re-render from them. Signals
//! must be written inside the Dioxus runtime, so build the `SyncClient` from a
//! component (or a `use_hook`) rather than before `dioxus::launch`.

pub mod feed;
pub mod messages;
pub mod presence;
pub mod profile;

use dioxus::prelude::*;
use forumsync_shared::{Notification, Post, PostId, UserId, UserSummary};

use crate::sync::{ChatMessage, FollowCounter, Notice, ProfileFields, Thread, ViewPort};
use crate::ws::ConnectionState;

pub use feed::{
    FRESH_POSTS, NEW_NOTIFICATIONS, NEW_SUGGESTIONS, NOTIFICATION_BADGE, POST_COUNT, REACTIONS,
};
pub use messages::{CHAT, THREADS, TYPING, UNREAD_MESSAGES};
pub use presence::{is_online, PRESENCE};
pub use profile::{get_cached_profile, photos_refreshed, FOLLOW_STATS, PROFILES, STALE_PHOTOS};

pub static CONNECTION: GlobalSignal<ConnectionState> = Signal::global(|| ConnectionState::Closed);

/// Blocking notice to show over the page, if any.
pub static NOTICE: GlobalSignal<Option<Notice>> = Signal::global(|| None);

#[derive(Debug, Clone, Copy, Default)]
pub struct DioxusView;

impl DioxusView {
    /// Drop everything the stores hold (on logout).
    pub fn clear() {
        feed::clear_feed_state();
        messages::clear_chat_state();
        presence::clear_presence();
        profile::clear_profiles();
        *NOTICE.write() = None;
    }
}

impl ViewPort for DioxusView {
    fn post_prepended(&self, post: &Post) {
        feed::prepend_post(post.clone());
    }

    fn post_reactions_changed(&self, post_id: PostId, likes: i64, dislikes: i64) {
        feed::set_reactions(post_id, likes, dislikes);
    }

    fn post_count_changed(&self, count: u64) {
        *POST_COUNT.write() = Some(count);
    }

    fn photos_stale(&self, user_id: UserId) {
        profile::mark_photos_stale(user_id);
    }

    fn presence_changed(&self, user_id: UserId, online: bool) {
        presence::update_presence(user_id, online);
    }

    fn follow_count_changed(&self, counter: FollowCounter, value: u64) {
        profile::set_follow_count(counter, value);
    }

    fn suggestion_prepended(&self, user: &UserSummary) {
        NEW_SUGGESTIONS.write().insert(0, user.clone());
    }

    fn chat_message_appended(&self, message: &ChatMessage) {
        messages::push_chat_message(message.clone());
    }

    fn chat_history_prepended(&self, _partner_id: UserId, messages: &[ChatMessage]) {
        messages::prepend_history(messages);
    }

    fn thread_moved_to_top(&self, thread: &Thread) {
        messages::move_thread_to_top(thread.clone());
    }

    fn typing_changed(&self, partner_id: UserId, typing: bool) {
        messages::set_typing(partner_id, typing);
    }

    fn profile_changed(&self, user_id: UserId, fields: &ProfileFields) {
        profile::cache_profile(user_id, fields.clone());
    }

    fn notification_prepended(&self, notification: &Notification) {
        NEW_NOTIFICATIONS.write().insert(0, notification.clone());
    }

    fn notification_badge_changed(&self, unread: u64) {
        *NOTIFICATION_BADGE.write() = unread;
    }

    fn unread_messages_changed(&self, unread: u64) {
        *UNREAD_MESSAGES.write() = unread;
    }

    fn connection_changed(&self, state: &ConnectionState) {
        *CONNECTION.write() = state.clone();
    }

    fn notice(&self, notice: Notice) {
        *NOTICE.write() = Some(notice);
    }
}
