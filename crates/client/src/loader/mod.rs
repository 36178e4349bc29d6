//! Incremental paginated list loading.
//!
//! One `PaginatedLoader` per list (feed, notifications, suggestions, friends,
//! connections, chat history, user search). Each instance owns its own `ListQuery`; instances share
//! nothing. The loader keeps the items it has fetched so that server-pushed
//! entries can be inserted at the head without disturbing the page cursor.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use forumsync_shared::{
    ApiError, ConnectionEntry, DirectMessage, Friend, Notification, Post, UserSummary,
};

use crate::config::ListSettings;

mod sources;
mod trigger;

pub use sources::{
    ConnectionTab, ConnectionsSource, ConversationSource, FeedSource, FriendsSource,
    NotificationsSource, PageSource, SuggestionsSource, UserSearchSource,
};
pub use trigger::{ScrollMetrics, Trigger};

/// Items with a stable server-issued identity.
pub trait Keyed {
    type Key: Eq + Hash + Clone;

    fn key(&self) -> Self::Key;
}

impl Keyed for Post {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for Notification {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for UserSummary {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for Friend {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for ConnectionEntry {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

impl Keyed for DirectMessage {
    type Key = i64;

    fn key(&self) -> i64 {
        self.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeMode {
    /// Result replaces the list; cursor back to page 1.
    Replace,
    /// Result is appended; cursor moves to the next page.
    Append,
}

/// Cursor and guard state of one list.
#[derive(Debug, Clone, PartialEq)]
pub struct ListQuery {
    /// Last page merged into the list (1-based).
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
    pub is_loading: bool,
    pub merge_mode: MergeMode,
}

impl ListQuery {
    fn new(page_size: u32) -> Self {
        Self {
            page: 1,
            page_size,
            has_more: true,
            is_loading: false,
            merge_mode: MergeMode::Replace,
        }
    }
}

/// Page coordinates handed to a `PageSource`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// A fetch is already in flight for this list.
    AlreadyLoading,
    /// The previous page came back short.
    Exhausted,
    /// A scroll that did not reach the threshold.
    NotNearBottom,
    /// An upward scroll that did not reach the threshold.
    NotNearTop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadOutcome<T> {
    Skipped(SkipReason),
    /// Replace returned nothing: render the empty state.
    Empty,
    /// New items merged into the list (duplicates already removed).
    Loaded { items: Vec<T>, has_more: bool },
    /// A newer request superseded this one; its result was discarded.
    Stale,
}

impl<T> LoadOutcome<T> {
    /// True when the response was merged into the list (including an empty first page).
    pub fn is_applied(&self) -> bool {
        matches!(self, LoadOutcome::Loaded { .. } | LoadOutcome::Empty)
    }
}

struct LoaderState<T> {
    query: ListQuery,
    items: Vec<T>,
    /// Bumped for every fetch and every switch; a response is applied only
    /// when it still matches.
    seq: u64,
    loaded: bool,
}

pub struct PaginatedLoader<T> {
    settings: ListSettings,
    state: Mutex<LoaderState<T>>,
}

impl<T: Keyed + Clone> PaginatedLoader<T> {
    pub fn new(settings: ListSettings) -> Self {
        Self {
            settings,
            state: Mutex::new(LoaderState {
                query: ListQuery::new(settings.page_size),
                items: Vec::new(),
                seq: 0,
                loaded: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn settings(&self) -> ListSettings {
        self.settings
    }

    pub fn query(&self) -> ListQuery {
        self.lock().query.clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.lock().items.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    /// Fetch one page and merge it. A call while another fetch is in flight
    /// does nothing; a failed fetch leaves the cursor as it was.
    pub async fn load<S>(&self, mode: MergeMode, source: &S) -> Result<LoadOutcome<T>, ApiError>
    where
        S: PageSource<Item = T> + ?Sized,
    {
        let (seq, request) = {
            let mut st = self.lock();
            if st.query.is_loading {
                return Ok(LoadOutcome::Skipped(SkipReason::AlreadyLoading));
            }
            if mode == MergeMode::Append && st.loaded && !st.query.has_more {
                return Ok(LoadOutcome::Skipped(SkipReason::Exhausted));
            }
            let page = match mode {
                MergeMode::Append if st.loaded => st.query.page + 1,
                _ => 1,
            };
            st.query.is_loading = true;
            st.query.merge_mode = mode;
            st.seq += 1;
            (
                st.seq,
                PageRequest {
                    page,
                    limit: st.query.page_size,
                },
            )
        };

        let result = source.fetch(request).await;

        let mut st = self.lock();
        if st.seq != seq {
            crate::log_debug!("Discarding stale page {} response", request.page);
            return Ok(LoadOutcome::Stale);
        }
        st.query.is_loading = false;

        let fetched = match result {
            Ok(items) => items,
            Err(e) => {
                crate::log_warn!("Page {} fetch failed: {}", request.page, e);
                return Err(e);
            }
        };

        let has_more = fetched.len() >= request.limit as usize;
        st.query.has_more = has_more;
        st.query.page = request.page;
        st.loaded = true;

        if request.page == 1 {
            st.items = dedup(fetched);
            if st.items.is_empty() {
                return Ok(LoadOutcome::Empty);
            }
            return Ok(LoadOutcome::Loaded {
                items: st.items.clone(),
                has_more,
            });
        }

        let known: HashSet<T::Key> = st.items.iter().map(Keyed::key).collect();
        let fresh: Vec<T> = dedup(fetched)
            .into_iter()
            .filter(|item| !known.contains(&item.key()))
            .collect();
        st.items.extend(fresh.iter().cloned());
        Ok(LoadOutcome::Loaded {
            items: fresh,
            has_more,
        })
    }

    /// Tab or category switch: supersede any in-flight fetch, clear the list
    /// and reload page 1 from `source`.
    pub async fn switch<S>(&self, source: &S) -> Result<LoadOutcome<T>, ApiError>
    where
        S: PageSource<Item = T> + ?Sized,
    {
        {
            let mut st = self.lock();
            st.seq += 1;
            st.items.clear();
            st.loaded = false;
            st.query = ListQuery::new(st.query.page_size);
        }
        self.load(MergeMode::Replace, source).await
    }

    /// Route a UI trigger to the matching load.
    pub async fn trigger<S>(&self, trigger: Trigger, source: &S) -> Result<LoadOutcome<T>, ApiError>
    where
        S: PageSource<Item = T> + ?Sized,
    {
        match trigger {
            Trigger::Scroll(metrics) => {
                if !metrics.near_bottom(self.settings.scroll_threshold_px) {
                    return Ok(LoadOutcome::Skipped(SkipReason::NotNearBottom));
                }
                self.load(MergeMode::Append, source).await
            }
            Trigger::ScrollUp(metrics) => {
                if !metrics.near_top(self.settings.scroll_threshold_px) {
                    return Ok(LoadOutcome::Skipped(SkipReason::NotNearTop));
                }
                self.load(MergeMode::Append, source).await
            }
            Trigger::LoadMore => self.load(MergeMode::Append, source).await,
            Trigger::Refresh => self.load(MergeMode::Replace, source).await,
            Trigger::TabSwitch => self.switch(source).await,
        }
    }

    /// Insert a server-pushed item at the head. Returns false for a known id.
    /// The page cursor is untouched.
    pub fn insert_head(&self, item: T) -> bool {
        let mut st = self.lock();
        let key = item.key();
        if st.items.iter().any(|existing| existing.key() == key) {
            return false;
        }
        st.items.insert(0, item);
        true
    }

    /// Apply `f` to the item with `key`, returning the updated copy.
    pub fn update(&self, key: &T::Key, f: impl FnOnce(&mut T)) -> Option<T> {
        let mut st = self.lock();
        let item = st.items.iter_mut().find(|item| &item.key() == key)?;
        f(item);
        Some(item.clone())
    }

    /// Forget everything, including any in-flight fetch.
    pub fn reset(&self) {
        let mut st = self.lock();
        st.seq += 1;
        st.items.clear();
        st.loaded = false;
        st.query = ListQuery::new(st.query.page_size);
    }
}

fn dedup<T: Keyed>(items: Vec<T>) -> Vec<T> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.key()))
        .collect()
}
