//! Forumsync Client - headless session
//!
//! Signs in with `FORUMSYNC_TOKEN` / `FORUMSYNC_USER_ID`, loads the first page
//! of every list and logs each view update until Ctrl-C.

#[cfg(not(target_arch = "wasm32"))]
#[tokio::main]
async fn main() {
    native::run().await;
}

#[cfg(target_arch = "wasm32")]
fn main() {}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use std::sync::Arc;

    use forumsync_client::sync::{ChatMessage, FollowCounter, Notice, Thread, ViewPort};
    use forumsync_client::{logging, ConnectionState, SyncClient, SyncConfig, Trigger};
    use forumsync_shared::{Notification, Post, PostId, UserId, UserSummary};

    /// Writes every view update to the log.
    struct LogView;

    impl ViewPort for LogView {
        fn post_prepended(&self, post: &Post) {
            tracing::info!(post_id = post.id, "new post: {}", post.title);
        }

        fn post_reactions_changed(&self, post_id: PostId, likes: i64, dislikes: i64) {
            tracing::info!(post_id, likes, dislikes, "reactions changed");
        }

        fn post_count_changed(&self, count: u64) {
            tracing::info!(count, "post count");
        }

        fn presence_changed(&self, user_id: UserId, online: bool) {
            tracing::info!(user_id, online, "presence");
        }

        fn follow_count_changed(&self, counter: FollowCounter, value: u64) {
            tracing::info!(?counter, value, "follow count");
        }

        fn suggestion_prepended(&self, user: &UserSummary) {
            tracing::info!(user_id = user.id, "new suggestion: {}", user.nickname);
        }

        fn chat_message_appended(&self, message: &ChatMessage) {
            tracing::info!(sender = message.sender_id, "chat: {}", message.content);
        }

        fn thread_moved_to_top(&self, thread: &Thread) {
            tracing::info!(partner = thread.partner_id, unread = thread.unread, "thread: {}", thread.preview);
        }

        fn notification_prepended(&self, notification: &Notification) {
            tracing::info!(id = notification.id, "notification: {}", notification.kind);
        }

        fn notification_badge_changed(&self, unread: u64) {
            tracing::info!(unread, "notification badge");
        }

        fn unread_messages_changed(&self, unread: u64) {
            tracing::info!(unread, "unread messages");
        }

        fn connection_changed(&self, state: &ConnectionState) {
            tracing::info!(?state, "connection");
        }

        fn notice(&self, notice: Notice) {
            tracing::error!("{}", notice.message());
        }
    }

    fn credentials() -> Result<(String, UserId), String> {
        let token = std::env::var("FORUMSYNC_TOKEN").map_err(|_| "FORUMSYNC_TOKEN is not set")?;
        let raw = std::env::var("FORUMSYNC_USER_ID").map_err(|_| "FORUMSYNC_USER_ID is not set")?;
        let user_id = raw
            .trim()
            .parse()
            .map_err(|_| format!("FORUMSYNC_USER_ID is not a user id: {raw:?}"))?;
        Ok((token, user_id))
    }

    pub async fn run() {
        logging::init_native();

        let config = SyncConfig::from_env();
        let (token, user_id) = match credentials() {
            Ok(creds) => creds,
            Err(e) => {
                tracing::error!("{}", e);
                return;
            }
        };

        let client = SyncClient::native(config, Arc::new(LogView));
        if let Err(e) = client.start(&token, user_id) {
            tracing::error!("Could not open the socket: {}", e);
            return;
        }

        match client.load_feed(Trigger::Refresh).await {
            Ok(outcome) => tracing::debug!(?outcome, "feed loaded"),
            Err(e) => tracing::warn!("Feed load failed: {}", e.user_message()),
        }
        if let Err(e) = client.load_notifications(Trigger::Refresh).await {
            tracing::warn!("Notifications load failed: {}", e.user_message());
        }
        if let Err(e) = client.load_suggestions(Trigger::Refresh).await {
            tracing::warn!("Suggestions load failed: {}", e.user_message());
        }

        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
        }
        tracing::info!("Shutting down");
        if let Err(e) = client.logout().await {
            tracing::warn!("Logout failed: {}", e);
        }
    }
}
