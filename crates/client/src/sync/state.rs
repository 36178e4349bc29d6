//! In-memory UI state kept in step with server events.

use std::collections::{HashMap, HashSet};

use forumsync_shared::{DirectMessage, MessageUser, PostId, UserId};
use serde_json::{Map, Value};

/// One row of the conversations sidebar.
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub partner_id: UserId,
    pub nickname: String,
    pub avatar: Option<String>,
    pub is_online: bool,
    pub preview: String,
    pub timestamp: Option<String>,
    pub unread: bool,
}

impl Thread {
    /// A thread for a sender the sidebar has not seen yet.
    pub fn from_sender(user: &MessageUser) -> Self {
        Self {
            partner_id: user.id,
            nickname: user.nickname.clone(),
            avatar: user.avatar.clone(),
            is_online: user.is_online,
            preview: String::new(),
            timestamp: None,
            unread: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub content: String,
    pub timestamp: Option<String>,
}

impl From<&DirectMessage> for ChatMessage {
    fn from(message: &DirectMessage) -> Self {
        Self {
            sender_id: message.sender_id,
            content: message.content.clone(),
            timestamp: message.timestamp.clone(),
        }
    }
}

/// Follower/following counters of the displayed profile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FollowStats {
    pub followers: u64,
    pub following: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowCounter {
    Followers,
    Following,
}

/// Cached profile sections, merged field by field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProfileFields {
    pub profile: Map<String, Value>,
    pub about: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    pub viewer_id: Option<UserId>,
    /// Partner of the chat window currently open, if any.
    pub open_chat: Option<UserId>,
    pub chat: Vec<ChatMessage>,
    pub partner_typing: bool,
    /// Most recent first.
    pub threads: Vec<Thread>,
    pub presence: HashMap<UserId, bool>,
    pub follow_stats: FollowStats,
    pub post_count: Option<u64>,
    pub profiles: HashMap<UserId, ProfileFields>,
    pub unread_messages: u64,
    pub unread_notifications: u64,
    /// Posts pushed since the feed was last loaded.
    pub fresh_posts: HashSet<PostId>,
}

impl SyncState {
    pub fn thread(&self, partner_id: UserId) -> Option<&Thread> {
        self.threads.iter().find(|t| t.partner_id == partner_id)
    }
}
