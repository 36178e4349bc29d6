//! The port through which reconciliation reaches the rendered UI.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use forumsync_shared::{Notification, NotificationId, Post, PostId, UserId, UserSummary};

use super::state::{ChatMessage, FollowCounter, ProfileFields, Thread};
use crate::ws::ConnectionState;

/// Blocking, user-visible notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    ConnectionLost,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::ConnectionLost => "Connection lost. Please refresh the page.",
        }
    }
}

/// View updates emitted by the handlers. Every method defaults to a no-op so a
/// front end only implements the regions it renders.
pub trait ViewPort: Send + Sync {
    /// Render a post at the top of the feed, marked as new.
    fn post_prepended(&self, _post: &Post) {}

    fn post_reactions_changed(&self, _post_id: PostId, _likes: i64, _dislikes: i64) {}

    fn post_count_changed(&self, _count: u64) {}

    /// The user's photo strip should be fetched again.
    fn photos_stale(&self, _user_id: UserId) {}

    /// Update every status indicator bound to `user_id`.
    fn presence_changed(&self, _user_id: UserId, _online: bool) {}

    fn follow_count_changed(&self, _counter: FollowCounter, _value: u64) {}

    fn suggestion_prepended(&self, _user: &UserSummary) {}

    /// Append to the open chat and scroll it to the bottom.
    fn chat_message_appended(&self, _message: &ChatMessage) {}

    /// Older messages inserted above the open chat, oldest first. Keep the
    /// reader's scroll position.
    fn chat_history_prepended(&self, _partner_id: UserId, _messages: &[ChatMessage]) {}

    fn thread_moved_to_top(&self, _thread: &Thread) {}

    fn typing_changed(&self, _partner_id: UserId, _typing: bool) {}

    fn profile_changed(&self, _user_id: UserId, _fields: &ProfileFields) {}

    fn notification_prepended(&self, _notification: &Notification) {}

    fn notification_badge_changed(&self, _unread: u64) {}

    fn unread_messages_changed(&self, _unread: u64) {}

    fn connection_changed(&self, _state: &ConnectionState) {}

    fn notice(&self, _notice: Notice) {}
}

/// What a `MemoryView` saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    PostPrepended(PostId),
    PostReactions { post_id: PostId, likes: i64, dislikes: i64 },
    PostCount(u64),
    PhotosStale(UserId),
    Presence { user_id: UserId, online: bool },
    FollowCount(FollowCounter, u64),
    SuggestionPrepended(UserId),
    ChatAppended(ChatMessage),
    ChatHistoryPrepended { partner_id: UserId, count: usize },
    ThreadToTop(UserId),
    Typing { partner_id: UserId, typing: bool },
    Profile(UserId),
    NotificationPrepended(NotificationId),
    NotificationBadge(u64),
    UnreadMessages(u64),
    Connection(ConnectionState),
    Notice(Notice),
}

#[derive(Default)]
struct MemoryInner {
    updates: Vec<ViewUpdate>,
    /// Status indicators by user: (location, online).
    indicators: HashMap<UserId, Vec<(String, bool)>>,
}

/// Headless view that records updates. Useful for tests and for embedding the
/// sync layer without a DOM.
#[derive(Default)]
pub struct MemoryView {
    inner: Mutex<MemoryInner>,
}

impl MemoryView {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, update: ViewUpdate) {
        self.lock().updates.push(update);
    }

    /// Bind a status indicator at `location` (sidebar, chat header, ...) to `user_id`.
    pub fn register_indicator(&self, user_id: UserId, location: &str) {
        self.lock()
            .indicators
            .entry(user_id)
            .or_default()
            .push((location.to_string(), false));
    }

    pub fn indicators(&self, user_id: UserId) -> Vec<(String, bool)> {
        self.lock()
            .indicators
            .get(&user_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn updates(&self) -> Vec<ViewUpdate> {
        self.lock().updates.clone()
    }

    pub fn take_updates(&self) -> Vec<ViewUpdate> {
        std::mem::take(&mut self.lock().updates)
    }
}

impl ViewPort for MemoryView {
    fn post_prepended(&self, post: &Post) {
        self.record(ViewUpdate::PostPrepended(post.id));
    }

    fn post_reactions_changed(&self, post_id: PostId, likes: i64, dislikes: i64) {
        self.record(ViewUpdate::PostReactions {
            post_id,
            likes,
            dislikes,
        });
    }

    fn post_count_changed(&self, count: u64) {
        self.record(ViewUpdate::PostCount(count));
    }

    fn photos_stale(&self, user_id: UserId) {
        self.record(ViewUpdate::PhotosStale(user_id));
    }

    fn presence_changed(&self, user_id: UserId, online: bool) {
        let mut inner = self.lock();
        if let Some(indicators) = inner.indicators.get_mut(&user_id) {
            for (_, state) in indicators.iter_mut() {
                *state = online;
            }
        }
        inner.updates.push(ViewUpdate::Presence { user_id, online });
    }

    fn follow_count_changed(&self, counter: FollowCounter, value: u64) {
        self.record(ViewUpdate::FollowCount(counter, value));
    }

    fn suggestion_prepended(&self, user: &UserSummary) {
        self.record(ViewUpdate::SuggestionPrepended(user.id));
    }

    fn chat_message_appended(&self, message: &ChatMessage) {
        self.record(ViewUpdate::ChatAppended(message.clone()));
    }

    fn chat_history_prepended(&self, partner_id: UserId, messages: &[ChatMessage]) {
        self.record(ViewUpdate::ChatHistoryPrepended {
            partner_id,
            count: messages.len(),
        });
    }

    fn thread_moved_to_top(&self, thread: &Thread) {
        self.record(ViewUpdate::ThreadToTop(thread.partner_id));
    }

    fn typing_changed(&self, partner_id: UserId, typing: bool) {
        self.record(ViewUpdate::Typing { partner_id, typing });
    }

    fn profile_changed(&self, user_id: UserId, _fields: &ProfileFields) {
        self.record(ViewUpdate::Profile(user_id));
    }

    fn notification_prepended(&self, notification: &Notification) {
        self.record(ViewUpdate::NotificationPrepended(notification.id));
    }

    fn notification_badge_changed(&self, unread: u64) {
        self.record(ViewUpdate::NotificationBadge(unread));
    }

    fn unread_messages_changed(&self, unread: u64) {
        self.record(ViewUpdate::UnreadMessages(unread));
    }

    fn connection_changed(&self, state: &ConnectionState) {
        self.record(ViewUpdate::Connection(state.clone()));
    }

    fn notice(&self, notice: Notice) {
        self.record(ViewUpdate::Notice(notice));
    }
}
