//! One page session of the sync layer: socket, reconciliation and lists wired together.

use std::sync::Arc;

use forumsync_shared::{
    ApiError, ClientFrame, ConnectionEntry, DirectMessage, Friend, Notification, Post,
    PostReaction, UnreadCountUpdate, UserId, UserSummary,
};

use crate::api_client::ApiClient;
use crate::config::{ListConfig, SyncConfig};
use crate::loader::{
    ConnectionTab, ConnectionsSource, ConversationSource, FeedSource, FriendsSource, LoadOutcome,
    NotificationsSource, PaginatedLoader, SuggestionsSource, Trigger, UserSearchSource,
};
use crate::sync::{ChatMessage, Dispatcher, Notice, Reconciler, ViewPort};
use crate::ws::{
    CloseReason, ConnectionManager, ConnectionState, Connector, SendError, TransportError,
    WsHandle,
};

/// The list loaders, one per paginated surface.
pub struct Loaders {
    pub feed: Arc<PaginatedLoader<Post>>,
    pub notifications: Arc<PaginatedLoader<Notification>>,
    pub suggestions: Arc<PaginatedLoader<UserSummary>>,
    pub friends: Arc<PaginatedLoader<Friend>>,
    pub connections: Arc<PaginatedLoader<ConnectionEntry>>,
    pub conversation: Arc<PaginatedLoader<DirectMessage>>,
    pub user_search: Arc<PaginatedLoader<UserSummary>>,
}

impl Loaders {
    fn new(lists: &ListConfig) -> Self {
        Self {
            feed: Arc::new(PaginatedLoader::new(lists.feed)),
            notifications: Arc::new(PaginatedLoader::new(lists.notifications)),
            suggestions: Arc::new(PaginatedLoader::new(lists.suggestions)),
            friends: Arc::new(PaginatedLoader::new(lists.friends)),
            connections: Arc::new(PaginatedLoader::new(lists.connections)),
            conversation: Arc::new(PaginatedLoader::new(lists.conversation)),
            user_search: Arc::new(PaginatedLoader::new(lists.user_search)),
        }
    }

    fn reset_all(&self) {
        self.feed.reset();
        self.notifications.reset();
        self.suggestions.reset();
        self.friends.reset();
        self.connections.reset();
        self.conversation.reset();
        self.user_search.reset();
    }
}

struct Sources {
    feed: FeedSource,
    notifications: NotificationsSource,
    suggestions: SuggestionsSource,
    friends: FriendsSource,
    connections: ConnectionsSource,
    conversation: ConversationSource,
    user_search: UserSearchSource,
}

impl Sources {
    fn new(api: &ApiClient) -> Self {
        Self {
            feed: FeedSource::new(api.clone()),
            notifications: NotificationsSource::new(api.clone()),
            suggestions: SuggestionsSource::new(api.clone()),
            friends: FriendsSource::new(api.clone()),
            connections: ConnectionsSource::new(api.clone(), ConnectionTab::Followers),
            conversation: ConversationSource::new(api.clone()),
            user_search: UserSearchSource::new(api.clone()),
        }
    }
}

pub struct SyncClient {
    api: ApiClient,
    manager: ConnectionManager,
    reconciler: Arc<Reconciler>,
    loaders: Loaders,
    sources: Sources,
}

impl SyncClient {
    pub fn new(config: SyncConfig, view: Arc<dyn ViewPort>, connector: Arc<dyn Connector>) -> Self {
        let api = ApiClient::new().with_base_url(config.api_url.clone());
        Self::with_api(api, config, view, connector)
    }

    /// Like [`SyncClient::new`] but with a prepared REST client; `config.api_url` is not used.
    pub fn with_api(
        api: ApiClient,
        config: SyncConfig,
        view: Arc<dyn ViewPort>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let loaders = Loaders::new(&config.lists);
        let reconciler = Arc::new(Reconciler::new(
            view.clone(),
            loaders.feed.clone(),
            loaders.suggestions.clone(),
            loaders.notifications.clone(),
        ));

        let dispatcher = Dispatcher::new(reconciler.clone());
        let manager = ConnectionManager::new(
            config.connection.clone(),
            connector,
            move |text| {
                dispatcher.dispatch(&text);
            },
            move |state| {
                view.connection_changed(&state);
                if state == ConnectionState::FailedPermanently {
                    view.notice(Notice::ConnectionLost);
                }
            },
        );

        Self {
            sources: Sources::new(&api),
            api,
            manager,
            reconciler,
            loaders,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn native(config: SyncConfig, view: Arc<dyn ViewPort>) -> Self {
        Self::new(config, view, Arc::new(crate::ws::TungsteniteConnector))
    }

    #[cfg(target_arch = "wasm32")]
    pub fn browser(config: SyncConfig, view: Arc<dyn ViewPort>) -> Self {
        Self::new(config, view, Arc::new(crate::ws::BrowserConnector))
    }

    /// Sign in the session: REST calls use `credential`, the socket opens with it.
    pub fn start(&self, credential: &str, viewer_id: UserId) -> Result<WsHandle, TransportError> {
        self.api.set_token(Some(credential.to_string()));
        self.reconciler.set_viewer(Some(viewer_id));
        self.manager.open(credential)
    }

    /// Sign out: flag the close as intended, end the server session, then drop
    /// the socket and all local state. Local teardown happens even when the
    /// server call fails; that error is returned.
    pub async fn logout(&self) -> Result<(), ApiError> {
        self.manager.mark_intentional_logout();
        let result = self.api.logout().await;
        if let Err(e) = &result {
            crate::log_warn!("Server logout failed: {}", e);
        }

        self.manager.close_current(CloseReason::Logout);
        self.api.set_token(None);
        self.reconciler.reset();
        self.loaders.reset_all();
        result
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn loaders(&self) -> &Loaders {
        &self.loaders
    }

    // --- Lists ---

    pub async fn load_feed(&self, trigger: Trigger) -> Result<LoadOutcome<Post>, ApiError> {
        let outcome = self.loaders.feed.trigger(trigger, &self.sources.feed).await?;
        if outcome.is_applied() && self.loaders.feed.query().page == 1 {
            self.reconciler.clear_fresh_posts();
        }
        Ok(outcome)
    }

    pub async fn switch_category(
        &self,
        category: Option<String>,
    ) -> Result<LoadOutcome<Post>, ApiError> {
        self.sources.feed.set_category(category);
        self.load_feed(Trigger::TabSwitch).await
    }

    pub async fn load_notifications(
        &self,
        trigger: Trigger,
    ) -> Result<LoadOutcome<Notification>, ApiError> {
        let outcome = self
            .loaders
            .notifications
            .trigger(trigger, &self.sources.notifications)
            .await?;
        if outcome.is_applied() {
            self.reconciler
                .set_unread_notifications(self.sources.notifications.unread());
        }
        Ok(outcome)
    }

    pub async fn load_suggestions(
        &self,
        trigger: Trigger,
    ) -> Result<LoadOutcome<UserSummary>, ApiError> {
        self.loaders
            .suggestions
            .trigger(trigger, &self.sources.suggestions)
            .await
    }

    pub async fn load_friends(&self, trigger: Trigger) -> Result<LoadOutcome<Friend>, ApiError> {
        self.loaders
            .friends
            .trigger(trigger, &self.sources.friends)
            .await
    }

    pub fn friends_total(&self) -> u64 {
        self.sources.friends.total_count()
    }

    pub async fn load_connections(
        &self,
        trigger: Trigger,
    ) -> Result<LoadOutcome<ConnectionEntry>, ApiError> {
        self.loaders
            .connections
            .trigger(trigger, &self.sources.connections)
            .await
    }

    pub async fn switch_connections_tab(
        &self,
        tab: ConnectionTab,
    ) -> Result<LoadOutcome<ConnectionEntry>, ApiError> {
        self.sources.connections.set_tab(tab);
        self.load_connections(Trigger::TabSwitch).await
    }

    pub fn connections_total(&self) -> u64 {
        self.sources.connections.total_count()
    }

    // --- Direct messages ---

    /// Open the chat with `partner_id` and load its newest history page.
    pub async fn open_conversation(
        &self,
        partner_id: UserId,
    ) -> Result<LoadOutcome<DirectMessage>, ApiError> {
        self.sources.conversation.set_peer(Some(partner_id));
        self.reconciler.open_chat(partner_id, Vec::new());
        let outcome = self
            .loaders
            .conversation
            .trigger(Trigger::TabSwitch, &self.sources.conversation)
            .await?;
        self.show_history(partner_id, &outcome);
        Ok(outcome)
    }

    /// Load the next older page of the open chat, on `ScrollUp` or `LoadMore`.
    pub async fn load_older_messages(
        &self,
        trigger: Trigger,
    ) -> Result<LoadOutcome<DirectMessage>, ApiError> {
        let Some(partner_id) = self.sources.conversation.peer() else {
            return Ok(LoadOutcome::Empty);
        };
        let outcome = self
            .loaders
            .conversation
            .trigger(trigger, &self.sources.conversation)
            .await?;
        self.show_history(partner_id, &outcome);
        Ok(outcome)
    }

    pub fn close_conversation(&self) {
        self.sources.conversation.set_peer(None);
        self.loaders.conversation.reset();
        self.reconciler.close_chat();
    }

    /// Pages arrive newest first; the chat shows them oldest first above what
    /// is already there.
    fn show_history(&self, partner_id: UserId, outcome: &LoadOutcome<DirectMessage>) {
        if let LoadOutcome::Loaded { items, .. } = outcome {
            let older: Vec<ChatMessage> = items
                .iter()
                .rev()
                .filter(|m| m.involves(partner_id))
                .map(ChatMessage::from)
                .collect();
            self.reconciler.prepend_history(partner_id, older);
        }
    }

    /// Search users by nickname for a new conversation.
    pub async fn search_users(&self, query: &str) -> Result<LoadOutcome<UserSummary>, ApiError> {
        self.sources.user_search.set_query(query);
        self.loaders
            .user_search
            .trigger(Trigger::TabSwitch, &self.sources.user_search)
            .await
    }

    pub async fn load_more_search_results(
        &self,
        trigger: Trigger,
    ) -> Result<LoadOutcome<UserSummary>, ApiError> {
        self.loaders
            .user_search
            .trigger(trigger, &self.sources.user_search)
            .await
    }

    // --- Outbound relays ---

    /// Tell other clients about a reaction already saved over REST.
    pub fn relay_reaction(&self, reaction: PostReaction) -> Result<(), SendError> {
        self.manager
            .send(&ClientFrame::PostReaction { payload: reaction })
    }

    /// Tell other clients the viewer's unread message count changed.
    pub fn relay_unread_count(&self, unread_count: u64) -> Result<(), SendError> {
        self.manager.send(&ClientFrame::UnreadCountUpdate {
            payload: UnreadCountUpdate { unread_count },
        })
    }

    pub fn send_message(&self, content: impl Into<String>) -> Result<(), SendError> {
        self.manager.send(&ClientFrame::Message {
            content: content.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use forumsync_shared::ServerEvent;
    use futures_util::StreamExt;
    use tokio::sync::Notify;

    use super::*;
    use crate::api_client::testing::{client_for, serve};
    use crate::loader::SkipReason;
    use crate::sync::{MemoryView, ViewUpdate};
    use crate::ws::testing::{ScriptedConnector, Step};

    async fn settle_until(mut done: impl FnMut() -> bool) {
        for _ in 0..600 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_failure_shows_notice() {
        let view = Arc::new(MemoryView::new());
        let (connector, _servers) = ScriptedConnector::new(&[]);
        let client = SyncClient::new(SyncConfig::default(), view.clone(), Arc::new(connector));

        client.start("tok", 1).unwrap();
        settle_until(|| client.connection().state() == ConnectionState::FailedPermanently).await;

        assert!(view
            .updates()
            .contains(&ViewUpdate::Notice(Notice::ConnectionLost)));
    }

    #[tokio::test(start_paused = true)]
    async fn frames_flow_into_the_view() {
        let view = Arc::new(MemoryView::new());
        view.register_indicator(42, "sidebar");
        let (connector, mut servers) = ScriptedConnector::new(&[Step::Accept]);
        let client = SyncClient::new(SyncConfig::default(), view.clone(), Arc::new(connector));

        client.start("tok", 1).unwrap();
        let server = servers.next().await.unwrap();
        server.frame(r#"{"type":"user_online","payload":{"userId":42,"isOnline":true}}"#);

        settle_until(|| view.indicators(42)[0].1).await;
        assert_eq!(client.reconciler().snapshot().presence.get(&42), Some(&true));
    }

    #[tokio::test(start_paused = true)]
    async fn logout_tears_down_without_reconnecting() {
        let view = Arc::new(MemoryView::new());
        let (connector, mut servers) = ScriptedConnector::new(&[Step::Accept, Step::Accept]);
        let connector = Arc::new(connector);
        let client = SyncClient::new(SyncConfig::default(), view.clone(), connector.clone());

        client.start("tok", 1).unwrap();
        let mut server = servers.next().await.unwrap();
        settle_until(|| client.connection().state().is_open()).await;
        client.loaders().suggestions.insert_head(UserSummary {
            id: 9,
            nickname: "x".into(),
            avatar: None,
            profession: None,
            is_online: false,
        });

        // No credential means the server call fails fast; teardown still runs.
        client.api().set_token(None);
        assert_eq!(client.logout().await, Err(ApiError::Unauthorized));

        settle_until(|| client.connection().state() == ConnectionState::Closed).await;
        assert!(matches!(
            server.sent.next().await,
            Some(crate::ws::Outgoing::Close { .. })
        ));
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.connects().len(), 1);
        assert!(client.loaders().suggestions.is_empty());
        assert_eq!(client.reconciler().snapshot().viewer_id, None);
        assert!(client.api().token().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn relays_require_an_open_socket() {
        let view = Arc::new(MemoryView::new());
        let (connector, mut servers) = ScriptedConnector::new(&[Step::Accept]);
        let client = SyncClient::new(SyncConfig::default(), view, Arc::new(connector));

        assert!(matches!(client.relay_unread_count(2), Err(SendError::NotOpen)));

        client.start("tok", 1).unwrap();
        let mut server = servers.next().await.unwrap();
        settle_until(|| client.connection().state().is_open()).await;

        client.relay_unread_count(2).unwrap();
        assert_eq!(
            server.sent.next().await,
            Some(crate::ws::Outgoing::Text(
                r#"{"type":"unread_count_update","payload":{"unreadCount":2}}"#.to_string()
            ))
        );
    }

    fn offline_client(base: &str) -> SyncClient {
        let (connector, _servers) = ScriptedConnector::new(&[]);
        SyncClient::with_api(
            client_for(base),
            SyncConfig::default(),
            Arc::new(MemoryView::new()),
            Arc::new(connector),
        )
    }

    #[tokio::test]
    async fn stale_feed_load_keeps_fresh_posts() {
        let gate = Arc::new(Notify::new());
        let base = serve({
            let gate = gate.clone();
            move |request: String| {
                let gate = gate.clone();
                async move {
                    if !request.contains("category=") {
                        gate.notified().await;
                    }
                    (200, r#"{"posts":[],"page":1}"#.to_string())
                }
            }
        })
        .await;
        let client = offline_client(&base);
        let pushed: Post =
            serde_json::from_str(r#"{"id":5,"user_id":3,"title":"t","content":"c"}"#).unwrap();

        let (first, _) = tokio::join!(client.load_feed(Trigger::TabSwitch), async {
            let switched = client.switch_category(Some("tech".into())).await;
            assert_eq!(switched, Ok(LoadOutcome::Empty));
            client.reconciler().apply(ServerEvent::NewPost(pushed)).unwrap();
            gate.notify_one();
        });

        assert_eq!(first, Ok(LoadOutcome::Stale));
        assert!(client.reconciler().snapshot().fresh_posts.contains(&5));
    }

    #[tokio::test]
    async fn history_of_a_superseded_peer_is_dropped() {
        let gate = Arc::new(Notify::new());
        let base = serve({
            let gate = gate.clone();
            move |request: String| {
                let gate = gate.clone();
                async move {
                    if request.contains("recipient_id=7") {
                        gate.notified().await;
                        return (
                            200,
                            r#"[{"id":3,"sender_id":7,"recipient_id":1,"content":"from seven"}]"#
                                .to_string(),
                        );
                    }
                    (
                        200,
                        r#"[
                            {"id":2,"sender_id":8,"recipient_id":1,"content":"later","timestamp":"2024-05-01T10:01:00Z"},
                            {"id":1,"sender_id":1,"recipient_id":8,"content":"hi","timestamp":"2024-05-01T10:00:00Z"}
                        ]"#
                        .to_string(),
                    )
                }
            }
        })
        .await;
        let client = offline_client(&base);

        let (first, second) = tokio::join!(client.open_conversation(7), async {
            let outcome = client.open_conversation(8).await;
            gate.notify_one();
            outcome
        });

        assert_eq!(first, Ok(LoadOutcome::Stale));
        assert!(matches!(second, Ok(LoadOutcome::Loaded { has_more: false, .. })));
        let snapshot = client.reconciler().snapshot();
        assert_eq!(snapshot.open_chat, Some(8));
        let shown: Vec<&str> = snapshot.chat.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(shown, ["hi", "later"]);
        assert_eq!(client.loaders().conversation.len(), 2);
    }

    #[tokio::test]
    async fn search_results_end_on_a_short_page() {
        let base = serve(|request: String| async move {
            let ids: &[i64] = if request.contains("page=1&") {
                &[1, 2, 3, 4, 5]
            } else {
                &[6, 7]
            };
            let users: Vec<String> = ids
                .iter()
                .map(|id| format!(r#"{{"id":{id},"nickname":"ne{id}"}}"#))
                .collect();
            (200, format!("[{}]", users.join(",")))
        })
        .await;
        let client = offline_client(&base);

        let first = client.search_users("  ne ").await.unwrap();
        assert!(matches!(first, LoadOutcome::Loaded { ref items, has_more: true } if items.len() == 5));
        assert_eq!(client.sources.user_search.query(), "ne");

        let second = client.load_more_search_results(Trigger::LoadMore).await.unwrap();
        assert!(matches!(second, LoadOutcome::Loaded { ref items, has_more: false } if items.len() == 2));

        assert_eq!(
            client.load_more_search_results(Trigger::LoadMore).await,
            Ok(LoadOutcome::Skipped(SkipReason::Exhausted))
        );
        assert_eq!(client.loaders().user_search.len(), 7);
    }
}
