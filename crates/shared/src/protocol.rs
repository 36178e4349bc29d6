//! Real-time wire protocol: inbound event frames and outbound client frames.
//!
//! Every frame on the socket is a JSON object `{"type": ..., "payload": ...}`.
//! Decoding happens in two steps so callers can tell an event type they do not
//! know about (ignored) from a known event with a broken payload (dropped).

use std::fmt;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DecodeError;
use crate::models::{MessageUser, Notification, Post, PostId, UserId, UserSummary};

/// The closed set of event types the client understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    NewPost,
    PostCountUpdate,
    UserOnline,
    UserOffline,
    UserFollowed,
    UserUnfollowed,
    NewUser,
    NewMessage,
    NotificationCreated,
    TypingStatus,
    ProfileUpdate,
    PostReaction,
    UnreadCountUpdate,
    Ping,
    Pong,
}

impl EventKind {
    /// Map a wire `type` tag to a kind. Returns `None` for tags added server-side
    /// after this client was built.
    pub fn from_tag(tag: &str) -> Option<Self> {
        let kind = match tag {
            "new_post" => EventKind::NewPost,
            "post_count_update" => EventKind::PostCountUpdate,
            "user_online" => EventKind::UserOnline,
            "user_offline" => EventKind::UserOffline,
            "user_followed" => EventKind::UserFollowed,
            "user_unfollowed" => EventKind::UserUnfollowed,
            "new_user" => EventKind::NewUser,
            "new_message" => EventKind::NewMessage,
            "notification_created" | "new_notification" | "NEW_NOTIFICATION" => {
                EventKind::NotificationCreated
            }
            "typing_status" => EventKind::TypingStatus,
            "profile_update" => EventKind::ProfileUpdate,
            "post_reaction" => EventKind::PostReaction,
            "unread_count_update" => EventKind::UnreadCountUpdate,
            "ping" => EventKind::Ping,
            "pong" => EventKind::Pong,
            _ => return None,
        };
        Some(kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::NewPost => "new_post",
            EventKind::PostCountUpdate => "post_count_update",
            EventKind::UserOnline => "user_online",
            EventKind::UserOffline => "user_offline",
            EventKind::UserFollowed => "user_followed",
            EventKind::UserUnfollowed => "user_unfollowed",
            EventKind::NewUser => "new_user",
            EventKind::NewMessage => "new_message",
            EventKind::NotificationCreated => "notification_created",
            EventKind::TypingStatus => "typing_status",
            EventKind::ProfileUpdate => "profile_update",
            EventKind::PostReaction => "post_reaction",
            EventKind::UnreadCountUpdate => "unread_count_update",
            EventKind::Ping => "ping",
            EventKind::Pong => "pong",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame as it arrives, before the payload is interpreted.
#[derive(Debug, Clone, Deserialize)]
pub struct RawFrame {
    #[serde(rename = "type")]
    pub tag: String,
    #[serde(default)]
    pub payload: Value,
}

impl RawFrame {
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(DecodeError::Json)
    }

    pub fn kind(&self) -> Option<EventKind> {
        EventKind::from_tag(&self.tag)
    }
}

// --- Event payloads ---

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostCountUpdate {
    #[serde(rename = "postCount")]
    pub post_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserStatus {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(rename = "isOnline", default)]
    pub is_online: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FollowUpdate {
    pub follower_id: UserId,
    pub following_id: UserId,
    #[serde(default)]
    pub followers_count: u64,
    #[serde(default)]
    pub following_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMessage {
    pub sender_id: UserId,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    pub user: MessageUser,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TypingStatus {
    pub sender_id: UserId,
    pub recipient_id: UserId,
    #[serde(default)]
    pub is_typing: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProfileUpdate {
    pub user_id: UserId,
    #[serde(default)]
    pub profile: Map<String, Value>,
    #[serde(default)]
    pub about: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PostReaction {
    pub post_id: PostId,
    pub likes: i64,
    pub dislikes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reaction_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnreadCountUpdate {
    #[serde(rename = "unreadCount")]
    pub unread_count: u64,
}

/// A fully decoded server event.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewPost(Post),
    PostCountUpdate(PostCountUpdate),
    UserStatus { user_id: UserId, online: bool },
    UserFollowed(FollowUpdate),
    UserUnfollowed(FollowUpdate),
    NewUser(UserSummary),
    NewMessage(NewMessage),
    NotificationCreated(Notification),
    TypingStatus(TypingStatus),
    ProfileUpdate(ProfileUpdate),
    PostReaction(PostReaction),
    UnreadCountUpdate(UnreadCountUpdate),
    Ping,
    Pong,
}

impl ServerEvent {
    /// Parse and decode a text frame in one go.
    pub fn from_text(text: &str) -> Result<Self, DecodeError> {
        Self::decode(RawFrame::parse(text)?)
    }

    pub fn decode(frame: RawFrame) -> Result<Self, DecodeError> {
        let kind = frame
            .kind()
            .ok_or_else(|| DecodeError::UnknownKind(frame.tag.clone()))?;
        let payload = frame.payload;

        let event = match kind {
            EventKind::NewPost => ServerEvent::NewPost(decode_payload(kind, unwrap_encoded(payload)?)?),
            EventKind::PostCountUpdate => ServerEvent::PostCountUpdate(decode_payload(kind, payload)?),
            EventKind::UserOnline | EventKind::UserOffline => {
                let status: UserStatus = decode_payload(kind, payload)?;
                ServerEvent::UserStatus {
                    user_id: status.user_id,
                    online: status.is_online.unwrap_or(kind == EventKind::UserOnline),
                }
            }
            EventKind::UserFollowed => ServerEvent::UserFollowed(decode_payload(kind, payload)?),
            EventKind::UserUnfollowed => ServerEvent::UserUnfollowed(decode_payload(kind, payload)?),
            EventKind::NewUser => ServerEvent::NewUser(decode_payload(kind, payload)?),
            EventKind::NewMessage => ServerEvent::NewMessage(decode_payload(kind, payload)?),
            EventKind::NotificationCreated => {
                ServerEvent::NotificationCreated(decode_payload(kind, payload)?)
            }
            EventKind::TypingStatus => ServerEvent::TypingStatus(decode_payload(kind, payload)?),
            EventKind::ProfileUpdate => ServerEvent::ProfileUpdate(decode_payload(kind, payload)?),
            EventKind::PostReaction => ServerEvent::PostReaction(decode_payload(kind, payload)?),
            EventKind::UnreadCountUpdate => {
                ServerEvent::UnreadCountUpdate(decode_payload(kind, payload)?)
            }
            EventKind::Ping => ServerEvent::Ping,
            EventKind::Pong => ServerEvent::Pong,
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ServerEvent::NewPost(_) => EventKind::NewPost,
            ServerEvent::PostCountUpdate(_) => EventKind::PostCountUpdate,
            ServerEvent::UserStatus { online: true, .. } => EventKind::UserOnline,
            ServerEvent::UserStatus { online: false, .. } => EventKind::UserOffline,
            ServerEvent::UserFollowed(_) => EventKind::UserFollowed,
            ServerEvent::UserUnfollowed(_) => EventKind::UserUnfollowed,
            ServerEvent::NewUser(_) => EventKind::NewUser,
            ServerEvent::NewMessage(_) => EventKind::NewMessage,
            ServerEvent::NotificationCreated(_) => EventKind::NotificationCreated,
            ServerEvent::TypingStatus(_) => EventKind::TypingStatus,
            ServerEvent::ProfileUpdate(_) => EventKind::ProfileUpdate,
            ServerEvent::PostReaction(_) => EventKind::PostReaction,
            ServerEvent::UnreadCountUpdate(_) => EventKind::UnreadCountUpdate,
            ServerEvent::Ping => EventKind::Ping,
            ServerEvent::Pong => EventKind::Pong,
        }
    }
}

/// `new_post` payloads are sent as base64-encoded JSON strings.
fn unwrap_encoded(payload: Value) -> Result<Value, DecodeError> {
    match payload {
        Value::String(encoded) => {
            let bytes = BASE64.decode(encoded.trim())?;
            serde_json::from_slice(&bytes).map_err(|source| DecodeError::Payload {
                kind: EventKind::NewPost,
                source,
            })
        }
        other => Ok(other),
    }
}

fn decode_payload<T: DeserializeOwned>(kind: EventKind, payload: Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
}

// --- Outbound ---

/// Frames the client writes to the socket.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Heartbeat.
    Ping,
    /// Legacy plain-text send path.
    Message { content: String },
    /// Relayed after a successful reaction REST call.
    PostReaction { payload: PostReaction },
    /// Relayed after marking a conversation read.
    UnreadCountUpdate { payload: UnreadCountUpdate },
}

impl ClientFrame {
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
