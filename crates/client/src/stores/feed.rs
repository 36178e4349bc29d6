//! Feed and notification store: pushed posts, reaction counts and badges.

use std::collections::HashMap;

use dioxus::prelude::*;
use forumsync_shared::{Notification, Post, PostId, UserSummary};

/// Posts pushed since the feed was loaded, newest first. Rendered above the
/// loaded pages with a "new" marker.
pub static FRESH_POSTS: GlobalSignal<Vec<Post>> = Signal::global(Vec::new);

/// Live (likes, dislikes) by post.
pub static REACTIONS: GlobalSignal<HashMap<PostId, (i64, i64)>> = Signal::global(HashMap::new);

pub static POST_COUNT: GlobalSignal<Option<u64>> = Signal::global(|| None);

/// Users pushed to the top of the suggestions list.
pub static NEW_SUGGESTIONS: GlobalSignal<Vec<UserSummary>> = Signal::global(Vec::new);

/// Notifications pushed since the list was loaded, newest first.
pub static NEW_NOTIFICATIONS: GlobalSignal<Vec<Notification>> = Signal::global(Vec::new);

pub static NOTIFICATION_BADGE: GlobalSignal<u64> = Signal::global(|| 0);

pub fn prepend_post(post: Post) {
    let mut posts = FRESH_POSTS.write();
    if !posts.iter().any(|p| p.id == post.id) {
        posts.insert(0, post);
    }
}

pub fn set_reactions(post_id: PostId, likes: i64, dislikes: i64) {
    REACTIONS.write().insert(post_id, (likes, dislikes));
}

/// Reaction counts for a post, if any were pushed.
pub fn reactions(post_id: PostId) -> Option<(i64, i64)> {
    REACTIONS.read().get(&post_id).copied()
}

pub fn clear_feed_state() {
    FRESH_POSTS.write().clear();
    REACTIONS.write().clear();
    *POST_COUNT.write() = None;
    NEW_SUGGESTIONS.write().clear();
    NEW_NOTIFICATIONS.write().clear();
    *NOTIFICATION_BADGE.write() = 0;
}
