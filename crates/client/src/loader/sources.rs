//! Page sources backed by the forum REST API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use forumsync_shared::{
    ApiError, ConnectionEntry, ConnectionsPage, DirectMessage, Friend, FriendsPage, Notification,
    NotificationsPage, Post, PostsPage, UserId, UserSummary,
};

use super::PageRequest;
use crate::api_client::{paged_path, ApiClient};

/// Fetches one page of a list.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait PageSource: Send + Sync {
    type Item: Send;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<Self::Item>, ApiError>;
}

/// `GET /api/posts`, optionally filtered by category.
pub struct FeedSource {
    api: ApiClient,
    category: RwLock<Option<String>>,
}

impl FeedSource {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            category: RwLock::new(None),
        }
    }

    /// Pair with `Trigger::TabSwitch` so the list reloads.
    pub fn set_category(&self, category: Option<String>) {
        *self.category.write().unwrap_or_else(PoisonError::into_inner) = category;
    }

    fn path(&self, page: PageRequest) -> String {
        let category = self
            .category
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match category.as_deref() {
            Some(category) if !category.is_empty() && category != "all" => {
                paged_path("/api/posts", page.page, page.limit, &[("category", category)])
            }
            _ => paged_path("/api/posts", page.page, page.limit, &[]),
        }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for FeedSource {
    type Item = Post;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<Post>, ApiError> {
        let body: PostsPage = self.api.get_json(&self.path(page)).await?;
        Ok(body.posts)
    }
}

/// `GET /api/notifications`; remembers the unread count of the last response.
pub struct NotificationsSource {
    api: ApiClient,
    unread: AtomicU64,
}

impl NotificationsSource {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            unread: AtomicU64::new(0),
        }
    }

    pub fn unread(&self) -> u64 {
        self.unread.load(Ordering::Relaxed)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for NotificationsSource {
    type Item = Notification;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<Notification>, ApiError> {
        let path = paged_path("/api/notifications", page.page, page.limit, &[]);
        let body: NotificationsPage = self.api.get_json(&path).await?;
        self.unread.store(body.unread, Ordering::Relaxed);
        Ok(body.notifications)
    }
}

/// `GET /api/users`: people the viewer might follow.
pub struct SuggestionsSource {
    api: ApiClient,
}

impl SuggestionsSource {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for SuggestionsSource {
    type Item = UserSummary;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<UserSummary>, ApiError> {
        let path = paged_path("/api/users", page.page, page.limit, &[]);
        let users: Option<Vec<UserSummary>> = self.api.get_json(&path).await?;
        Ok(users.unwrap_or_default())
    }
}

/// `GET /api/users/friends`.
pub struct FriendsSource {
    api: ApiClient,
    total: AtomicU64,
}

impl FriendsSource {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            total: AtomicU64::new(0),
        }
    }

    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for FriendsSource {
    type Item = Friend;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<Friend>, ApiError> {
        let path = paged_path("/api/users/friends", page.page, page.limit, &[]);
        let body: FriendsPage = self.api.get_json(&path).await?;
        self.total.store(body.total_count, Ordering::Relaxed);
        Ok(body.friends)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionTab {
    Followers,
    Following,
}

impl ConnectionTab {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionTab::Followers => "followers",
            ConnectionTab::Following => "following",
        }
    }
}

/// `GET /api/users/{followers|following}` for the selected tab.
pub struct ConnectionsSource {
    api: ApiClient,
    tab: RwLock<ConnectionTab>,
    total: AtomicU64,
}

impl ConnectionsSource {
    pub fn new(api: ApiClient, tab: ConnectionTab) -> Self {
        Self {
            api,
            tab: RwLock::new(tab),
            total: AtomicU64::new(0),
        }
    }

    pub fn tab(&self) -> ConnectionTab {
        *self.tab.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pair with `Trigger::TabSwitch` so the list reloads.
    pub fn set_tab(&self, tab: ConnectionTab) {
        *self.tab.write().unwrap_or_else(PoisonError::into_inner) = tab;
    }

    pub fn total_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for ConnectionsSource {
    type Item = ConnectionEntry;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<ConnectionEntry>, ApiError> {
        let path = format!("/api/users/{}", self.tab().as_str());
        let body: ConnectionsPage = self
            .api
            .get_json(&paged_path(&path, page.page, page.limit, &[]))
            .await?;
        self.total.store(body.total_count, Ordering::Relaxed);
        Ok(body.connections)
    }
}

/// `GET /messages/conversation` with one peer, newest first. Later pages are
/// older messages.
pub struct ConversationSource {
    api: ApiClient,
    peer: RwLock<Option<UserId>>,
}

impl ConversationSource {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            peer: RwLock::new(None),
        }
    }

    pub fn peer(&self) -> Option<UserId> {
        *self.peer.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pair with `Trigger::TabSwitch` so the history reloads.
    pub fn set_peer(&self, peer: Option<UserId>) {
        *self.peer.write().unwrap_or_else(PoisonError::into_inner) = peer;
    }

    fn path(&self, peer: UserId, page: PageRequest) -> String {
        let peer = peer.to_string();
        paged_path(
            "/messages/conversation",
            page.page,
            page.limit,
            &[("recipient_id", peer.as_str()), ("order", "desc")],
        )
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for ConversationSource {
    type Item = DirectMessage;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<DirectMessage>, ApiError> {
        let Some(peer) = self.peer() else {
            crate::log_debug!("No open conversation, nothing to fetch");
            return Ok(Vec::new());
        };
        let messages: Option<Vec<DirectMessage>> = self.api.get_json(&self.path(peer, page)).await?;
        Ok(messages.unwrap_or_default())
    }
}

/// `GET /api/users/search` for the recipient picker.
pub struct UserSearchSource {
    api: ApiClient,
    query: RwLock<String>,
}

impl UserSearchSource {
    pub fn new(api: ApiClient) -> Self {
        Self {
            api,
            query: RwLock::new(String::new()),
        }
    }

    pub fn query(&self) -> String {
        self.query
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pair with `Trigger::TabSwitch` so the results reload.
    pub fn set_query(&self, query: &str) {
        *self.query.write().unwrap_or_else(PoisonError::into_inner) = query.trim().to_string();
    }
}

#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
impl PageSource for UserSearchSource {
    type Item = UserSummary;

    async fn fetch(&self, page: PageRequest) -> Result<Vec<UserSummary>, ApiError> {
        let query = self.query();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let path = paged_path("/api/users/search", page.page, page.limit, &[("q", query.as_str())]);
        let users: Option<Vec<UserSummary>> = self.api.get_json(&path).await?;
        Ok(users.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn feed_path_skips_all_category() {
        let feed = FeedSource::new(ApiClient::new());
        let page = PageRequest { page: 3, limit: 10 };
        assert_eq!(feed.path(page), "/api/posts?page=3&limit=10");

        feed.set_category(Some("all".into()));
        assert_eq!(feed.path(page), "/api/posts?page=3&limit=10");

        feed.set_category(Some("music".into()));
        assert_eq!(feed.path(page), "/api/posts?page=3&limit=10&category=music");
    }

    #[test]
    fn conversation_path_names_the_peer() {
        let source = ConversationSource::new(ApiClient::new());
        assert_eq!(
            source.path(7, PageRequest { page: 2, limit: 20 }),
            "/messages/conversation?page=2&limit=20&recipient_id=7&order=desc"
        );
    }

    #[tokio::test]
    async fn blank_search_fetches_nothing() {
        let source = UserSearchSource::new(ApiClient::new());
        source.set_query("   ");
        let users = source.fetch(PageRequest { page: 1, limit: 5 }).await.unwrap();
        assert!(users.is_empty());

        let history = ConversationSource::new(ApiClient::new());
        assert!(history.fetch(PageRequest { page: 1, limit: 20 }).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sources_propagate_auth_failures() {
        let source = ConnectionsSource::new(ApiClient::new(), ConnectionTab::Following);
        let err = source.fetch(PageRequest { page: 1, limit: 10 }).await.unwrap_err();
        assert_eq!(err, ApiError::Unauthorized);
    }
}
