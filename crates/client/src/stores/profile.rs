//! Profile store: cached profile sections and the follow counters.

use std::collections::{HashMap, HashSet};

use dioxus::prelude::*;
use forumsync_shared::UserId;

use crate::sync::{FollowCounter, FollowStats, ProfileFields};

pub static PROFILES: GlobalSignal<HashMap<UserId, ProfileFields>> = Signal::global(HashMap::new);

pub static FOLLOW_STATS: GlobalSignal<FollowStats> = Signal::global(FollowStats::default);

/// Users whose photo strip must be fetched again before it is shown.
pub static STALE_PHOTOS: GlobalSignal<HashSet<UserId>> = Signal::global(HashSet::new);

pub fn cache_profile(user_id: UserId, fields: ProfileFields) {
    PROFILES.write().insert(user_id, fields);
}

pub fn get_cached_profile(user_id: UserId) -> Option<ProfileFields> {
    PROFILES.read().get(&user_id).cloned()
}

pub fn set_follow_count(counter: FollowCounter, value: u64) {
    let mut stats = FOLLOW_STATS.write();
    match counter {
        FollowCounter::Followers => stats.followers = value,
        FollowCounter::Following => stats.following = value,
    }
}

pub fn mark_photos_stale(user_id: UserId) {
    STALE_PHOTOS.write().insert(user_id);
}

/// Called by the photo strip once it has refetched.
pub fn photos_refreshed(user_id: UserId) {
    STALE_PHOTOS.write().remove(&user_id);
}

pub fn clear_profiles() {
    PROFILES.write().clear();
    STALE_PHOTOS.write().clear();
    *FOLLOW_STATS.write() = FollowStats::default();
}
