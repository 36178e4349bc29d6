//! Reconciliation of server events into local state.
//!
//! Each handler touches one slice of `SyncState` (or one loader list) and the
//! matching view region. Handlers are safe to run twice for the same event:
//! pushed list items are keyed by id and counters are overwritten.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use forumsync_shared::{
    EventKind, FollowUpdate, NewMessage, Notification, Post, PostReaction, ProfileUpdate,
    ServerEvent, TypingStatus, UserId, UserSummary,
};
use thiserror::Error;

use super::state::{ChatMessage, FollowCounter, FollowStats, SyncState, Thread};
use super::view::ViewPort;
use crate::loader::PaginatedLoader;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum HandlerError {
    #[error("`{0}` needs a signed-in viewer")]
    NoViewer(EventKind),
}

pub struct Reconciler {
    state: Mutex<SyncState>,
    feed: Arc<PaginatedLoader<Post>>,
    suggestions: Arc<PaginatedLoader<UserSummary>>,
    notifications: Arc<PaginatedLoader<Notification>>,
    view: Arc<dyn ViewPort>,
}

impl Reconciler {
    pub fn new(
        view: Arc<dyn ViewPort>,
        feed: Arc<PaginatedLoader<Post>>,
        suggestions: Arc<PaginatedLoader<UserSummary>>,
        notifications: Arc<PaginatedLoader<Notification>>,
    ) -> Self {
        Self {
            state: Mutex::new(SyncState::default()),
            feed,
            suggestions,
            notifications,
            view,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SyncState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn apply(&self, event: ServerEvent) -> Result<(), HandlerError> {
        match event {
            ServerEvent::NewPost(post) => self.on_new_post(post),
            ServerEvent::PostCountUpdate(update) => {
                self.lock().post_count = Some(update.post_count);
                self.view.post_count_changed(update.post_count);
            }
            ServerEvent::UserStatus { user_id, online } => self.on_status(user_id, online),
            ServerEvent::UserFollowed(update) => self.on_follow(EventKind::UserFollowed, update)?,
            ServerEvent::UserUnfollowed(update) => {
                self.on_follow(EventKind::UserUnfollowed, update)?
            }
            ServerEvent::NewUser(user) => self.on_new_user(user),
            ServerEvent::NewMessage(message) => self.on_new_message(message),
            ServerEvent::NotificationCreated(notification) => self.on_notification(notification),
            ServerEvent::TypingStatus(typing) => self.on_typing(typing)?,
            ServerEvent::ProfileUpdate(update) => self.on_profile_update(update),
            ServerEvent::PostReaction(reaction) => self.on_reaction(reaction),
            ServerEvent::UnreadCountUpdate(update) => {
                self.lock().unread_messages = update.unread_count;
                self.view.unread_messages_changed(update.unread_count);
            }
            ServerEvent::Ping | ServerEvent::Pong => {}
        }
        Ok(())
    }

    fn on_new_post(&self, post: Post) {
        if !self.feed.insert_head(post.clone()) {
            crate::log_debug!("Post {} already in feed", post.id);
            return;
        }
        self.lock().fresh_posts.insert(post.id);
        self.view.post_prepended(&post);
        if post.has_images() {
            self.view.photos_stale(post.user_id);
        }
    }

    fn on_status(&self, user_id: UserId, online: bool) {
        {
            let mut st = self.lock();
            st.presence.insert(user_id, online);
            if let Some(thread) = st.threads.iter_mut().find(|t| t.partner_id == user_id) {
                thread.is_online = online;
            }
        }
        self.view.presence_changed(user_id, online);
    }

    fn on_follow(&self, kind: EventKind, update: FollowUpdate) -> Result<(), HandlerError> {
        let changed = {
            let mut st = self.lock();
            let viewer = st.viewer_id.ok_or(HandlerError::NoViewer(kind))?;
            if update.following_id == viewer {
                st.follow_stats.followers = update.followers_count;
                Some((FollowCounter::Followers, update.followers_count))
            } else if update.follower_id == viewer {
                st.follow_stats.following = update.following_count;
                Some((FollowCounter::Following, update.following_count))
            } else {
                None
            }
        };

        match changed {
            Some((counter, value)) => self.view.follow_count_changed(counter, value),
            None => crate::log_debug!("{} does not involve the viewer", kind),
        }
        Ok(())
    }

    fn on_new_user(&self, user: UserSummary) {
        if self.lock().viewer_id == Some(user.id) {
            return;
        }
        if self.suggestions.insert_head(user.clone()) {
            self.view.suggestion_prepended(&user);
        }
    }

    fn on_new_message(&self, msg: NewMessage) {
        let message = ChatMessage {
            sender_id: msg.sender_id,
            content: msg.content,
            timestamp: msg.timestamp,
        };

        let (appended, thread) = {
            let mut st = self.lock();
            let chat_open = st.open_chat == Some(message.sender_id);
            // A redelivered frame must not show the message twice.
            let appended = chat_open && !st.chat.contains(&message);
            if appended {
                st.chat.push(message.clone());
                st.partner_typing = false;
            }

            let mut thread = match st
                .threads
                .iter()
                .position(|t| t.partner_id == message.sender_id)
            {
                Some(index) => st.threads.remove(index),
                None => Thread::from_sender(&msg.user),
            };
            if !msg.user.nickname.is_empty() {
                thread.nickname = msg.user.nickname.clone();
            }
            if msg.user.avatar.is_some() {
                thread.avatar = msg.user.avatar.clone();
            }
            thread.is_online = msg.user.is_online;
            thread.preview = message.content.clone();
            thread.timestamp = message.timestamp.clone();
            thread.unread = !chat_open;

            st.threads.insert(0, thread.clone());
            (appended, thread)
        };

        if appended {
            self.view.chat_message_appended(&message);
        }
        self.view.thread_moved_to_top(&thread);
    }

    fn on_notification(&self, notification: Notification) {
        if !self.notifications.insert_head(notification.clone()) {
            crate::log_debug!("Notification {} already listed", notification.id);
            return;
        }
        let badge = (!notification.is_read).then(|| {
            let mut st = self.lock();
            st.unread_notifications += 1;
            st.unread_notifications
        });

        self.view.notification_prepended(&notification);
        if let Some(unread) = badge {
            self.view.notification_badge_changed(unread);
        }
    }

    fn on_typing(&self, typing: TypingStatus) -> Result<(), HandlerError> {
        {
            let mut st = self.lock();
            let viewer = st
                .viewer_id
                .ok_or(HandlerError::NoViewer(EventKind::TypingStatus))?;
            if typing.recipient_id != viewer || st.open_chat != Some(typing.sender_id) {
                return Ok(());
            }
            st.partner_typing = typing.is_typing;
        }
        self.view.typing_changed(typing.sender_id, typing.is_typing);
        Ok(())
    }

    fn on_profile_update(&self, update: ProfileUpdate) {
        let fields = {
            let mut st = self.lock();
            let entry = st.profiles.entry(update.user_id).or_default();
            entry.profile.extend(update.profile);
            if let Some(about) = update.about {
                entry.about.extend(about);
            }
            entry.clone()
        };
        self.view.profile_changed(update.user_id, &fields);
    }

    fn on_reaction(&self, reaction: PostReaction) {
        let updated = self.feed.update(&reaction.post_id, |post| {
            post.likes = reaction.likes;
            post.dislikes = reaction.dislikes;
        });
        match updated {
            Some(_) => {
                self.view
                    .post_reactions_changed(reaction.post_id, reaction.likes, reaction.dislikes)
            }
            None => crate::log_debug!("Reaction for post {} not in feed", reaction.post_id),
        }
    }

    // --- Local UI actions ---

    pub fn set_viewer(&self, viewer_id: Option<UserId>) {
        self.lock().viewer_id = viewer_id;
    }

    /// The chat window with `partner_id` was opened with its loaded history.
    pub fn open_chat(&self, partner_id: UserId, history: Vec<ChatMessage>) {
        let mut st = self.lock();
        st.open_chat = Some(partner_id);
        st.chat = history;
        st.partner_typing = false;
        if let Some(thread) = st.threads.iter_mut().find(|t| t.partner_id == partner_id) {
            thread.unread = false;
        }
    }

    /// Older history for the open chat, oldest first. Ignored when the chat
    /// with `partner_id` is no longer open; messages already shown are skipped.
    pub fn prepend_history(&self, partner_id: UserId, older: Vec<ChatMessage>) {
        let added = {
            let mut st = self.lock();
            if st.open_chat != Some(partner_id) {
                return;
            }
            let added: Vec<ChatMessage> = older
                .into_iter()
                .filter(|m| !st.chat.contains(m))
                .collect();
            st.chat.splice(0..0, added.iter().cloned());
            added
        };
        if !added.is_empty() {
            self.view.chat_history_prepended(partner_id, &added);
        }
    }

    pub fn close_chat(&self) {
        let mut st = self.lock();
        st.open_chat = None;
        st.chat.clear();
        st.partner_typing = false;
    }

    pub fn set_threads(&self, threads: Vec<Thread>) {
        self.lock().threads = threads;
    }

    pub fn set_follow_stats(&self, stats: FollowStats) {
        self.lock().follow_stats = stats;
    }

    pub fn set_unread_notifications(&self, unread: u64) {
        self.lock().unread_notifications = unread;
        self.view.notification_badge_changed(unread);
    }

    /// The feed was reloaded; pushed posts are no longer "new".
    pub fn clear_fresh_posts(&self) {
        self.lock().fresh_posts.clear();
    }

    pub fn snapshot(&self) -> SyncState {
        self.lock().clone()
    }

    pub fn reset(&self) {
        *self.lock() = SyncState::default();
    }
}
