//! Shared data models for the forum API and real-time events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type UserId = i64;
pub type PostId = i64;
pub type NotificationId = i64;
pub type MessageId = i64;

// --- Serde helpers ---

/// Go encodes `nil` slices as `null`; treat that like an empty list.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts `"42"` or `42` (the backend tags some ids with `,string`).
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(i64),
        Null,
    }

    Ok(match Raw::deserialize(deserializer)? {
        Raw::Text(s) => s,
        Raw::Number(n) => n.to_string(),
        Raw::Null => String::new(),
    })
}

// --- Identity ---

/// Minimal user card used by suggestions, notification actors and `new_user` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserSummary {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default, alias = "isOnline")]
    pub is_online: bool,
}

/// Sender card embedded in `new_message` events.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageUser {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default, rename = "isOnline")]
    pub is_online: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Friend {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub mutual_friends: u32,
}

/// Entry in the followers / following lists.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionEntry {
    pub id: UserId,
    #[serde(default)]
    pub nickname: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub profession: Option<String>,
    #[serde(default)]
    pub is_online: bool,
    #[serde(default)]
    pub is_following: bool,
}

// --- Posts ---

/// `sql.NullString` arrives either as a plain string or as `{"String": .., "Valid": ..}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum NullableString {
    Plain(String),
    Sql {
        #[serde(rename = "String")]
        value: String,
        #[serde(rename = "Valid")]
        valid: bool,
    },
}

impl NullableString {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            NullableString::Plain(s) if !s.is_empty() => Some(s),
            NullableString::Sql { value, valid: true } => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Post {
    pub id: PostId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub user_id: UserId,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub likes: i64,
    #[serde(default)]
    pub dislikes: i64,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub video_url: Option<NullableString>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub images: Vec<String>,
}

impl Post {
    pub fn has_images(&self) -> bool {
        !self.images.is_empty()
    }
}

// --- Notifications ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: NotificationId,
    #[serde(default)]
    pub recipient_id: UserId,
    #[serde(default)]
    pub actor_id: UserId,
    /// `like`, `comment`, `follow`, `mention`, ...
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub entity_type: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub entity_id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub actor: Option<UserSummary>,
}

// --- Direct messages ---

/// A stored direct message, as returned by `GET /messages/conversation`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectMessage {
    pub id: MessageId,
    pub sender_id: UserId,
    #[serde(default)]
    pub recipient_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub user: Option<MessageUser>,
}

impl DirectMessage {
    /// True when `user_id` sent or received this message.
    pub fn involves(&self, user_id: UserId) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }
}

// --- Page responses ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostsPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub posts: Vec<Post>,
    #[serde(default)]
    pub page: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NotificationsPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notifications: Vec<Notification>,
    #[serde(default)]
    pub unread: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FriendsPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub friends: Vec<Friend>,
    #[serde(default, rename = "totalCount")]
    pub total_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConnectionsPage {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub connections: Vec<ConnectionEntry>,
    #[serde(default, rename = "totalCount")]
    pub total_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_accepts_go_encodings() {
        let post: Post = serde_json::from_value(serde_json::json!({
            "id": 3,
            "title": "hello",
            "author": "amy",
            "user_id": 9,
            "category": "general",
            "likes": 1,
            "dislikes": 0,
            "content": "first",
            "timestamp": "2024-05-01T10:00:00Z",
            "video_url": {"String": "", "Valid": false},
            "images": null
        }))
        .unwrap();

        assert_eq!(post.id, 3);
        assert!(!post.has_images());
        assert_eq!(post.video_url.as_ref().and_then(|v| v.as_str()), None);
    }

    #[test]
    fn notification_entity_id_may_be_a_string() {
        let n: Notification = serde_json::from_value(serde_json::json!({
            "id": 1,
            "type": "like",
            "entity_id": "77",
            "message": "liked",
            "is_read": false
        }))
        .unwrap();
        assert_eq!(n.entity_id, "77");
        assert_eq!(n.kind, "like");
    }

    #[test]
    fn conversation_message_reads_backend_shape() {
        let m: DirectMessage = serde_json::from_value(serde_json::json!({
            "id": 12,
            "sender_id": 7,
            "recipient_id": 1,
            "conversation_id": 3,
            "content": "hey",
            "timestamp": "2024-05-01 10:00:00",
            "is_read": true,
            "user": {"id": 7, "nickname": "sam", "avatar": "", "isOnline": true}
        }))
        .unwrap();
        assert!(m.involves(7) && m.involves(1) && !m.involves(2));
        assert_eq!(m.user.map(|u| u.nickname), Some("sam".to_string()));
    }
}
