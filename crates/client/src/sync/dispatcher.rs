//! Inbound frame classification and routing.

use std::sync::Arc;

use forumsync_shared::{DecodeError, RawFrame, ServerEvent};

use super::handlers::Reconciler;

/// What happened to one inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Applied,
    /// Event type this client does not handle.
    Ignored,
    /// Not decodable; nothing was changed.
    Dropped,
    /// Decoded, but the handler refused it.
    Failed,
}

/// Turns raw socket text into handler calls. Nothing escapes `dispatch`:
/// every failure is logged and reported as an outcome.
#[derive(Clone)]
pub struct Dispatcher {
    reconciler: Arc<Reconciler>,
}

impl Dispatcher {
    pub fn new(reconciler: Arc<Reconciler>) -> Self {
        Self { reconciler }
    }

    pub fn dispatch(&self, raw: &str) -> DispatchOutcome {
        let frame = match RawFrame::parse(raw) {
            Ok(frame) => frame,
            Err(e) => {
                crate::log_error!("Dropping unparsable frame: {}", e);
                return DispatchOutcome::Dropped;
            }
        };

        let event = match ServerEvent::decode(frame) {
            Ok(event) => event,
            Err(DecodeError::UnknownKind(tag)) => {
                crate::log_debug!("Ignoring unhandled event type: {}", tag);
                return DispatchOutcome::Ignored;
            }
            Err(e) => {
                crate::log_error!("Dropping malformed event: {}", e);
                return DispatchOutcome::Dropped;
            }
        };

        let kind = event.kind();
        match self.reconciler.apply(event) {
            Ok(()) => DispatchOutcome::Applied,
            Err(e) => {
                crate::log_warn!("Handler for {} failed: {}", kind, e);
                DispatchOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;
    use serde_json::json;

    use super::*;
    use crate::config::ListSettings;
    use crate::loader::PaginatedLoader;
    use crate::sync::view::{MemoryView, ViewUpdate};

    fn setup() -> (Dispatcher, Arc<Reconciler>, Arc<MemoryView>) {
        let view = Arc::new(MemoryView::new());
        let reconciler = Arc::new(Reconciler::new(
            view.clone(),
            Arc::new(PaginatedLoader::new(ListSettings::new(10, 100.0))),
            Arc::new(PaginatedLoader::new(ListSettings::new(5, 50.0))),
            Arc::new(PaginatedLoader::new(ListSettings::new(10, 100.0))),
        ));
        reconciler.set_viewer(Some(1));
        (Dispatcher::new(reconciler.clone()), reconciler, view)
    }

    #[test]
    fn presence_fans_out_to_every_indicator() {
        let (dispatcher, reconciler, view) = setup();
        view.register_indicator(42, "sidebar");
        view.register_indicator(42, "chat-header");
        view.register_indicator(43, "sidebar");

        let frame = json!({"type": "user_online", "payload": {"userId": 42, "isOnline": true}});
        assert_eq!(dispatcher.dispatch(&frame.to_string()), DispatchOutcome::Applied);

        assert!(view.indicators(42).iter().all(|(_, online)| *online));
        assert_eq!(view.indicators(42).len(), 2);
        assert!(!view.indicators(43)[0].1);
        assert_eq!(reconciler.snapshot().presence.get(&42), Some(&true));
    }

    #[test]
    fn bad_frames_never_change_state() {
        let (dispatcher, reconciler, view) = setup();
        let before = reconciler.snapshot();

        let unknown = json!({"type": "story_created", "payload": {"id": 1}}).to_string();
        let garbled_post = json!({"type": "new_post", "payload": "!!notbase64"}).to_string();
        let not_json_post = json!({"type": "new_post", "payload": BASE64.encode("{oops")}).to_string();
        let wrong_shape = json!({"type": "post_count_update", "payload": {"postCount": "many"}}).to_string();

        assert_eq!(dispatcher.dispatch(&unknown), DispatchOutcome::Ignored);
        assert_eq!(dispatcher.dispatch(&garbled_post), DispatchOutcome::Dropped);
        assert_eq!(dispatcher.dispatch(&not_json_post), DispatchOutcome::Dropped);
        assert_eq!(dispatcher.dispatch(&wrong_shape), DispatchOutcome::Dropped);
        assert_eq!(dispatcher.dispatch("not json"), DispatchOutcome::Dropped);

        assert_eq!(reconciler.snapshot(), before);
        assert!(view.updates().is_empty());
    }

    #[test]
    fn encoded_post_reaches_the_feed() {
        let (dispatcher, reconciler, view) = setup();
        let post = json!({"id": 5, "user_id": 2, "title": "hi", "images": null});
        let frame = json!({"type": "new_post", "payload": BASE64.encode(post.to_string())});

        assert_eq!(dispatcher.dispatch(&frame.to_string()), DispatchOutcome::Applied);
        assert!(reconciler.snapshot().fresh_posts.contains(&5));
        assert_eq!(view.updates(), vec![ViewUpdate::PostPrepended(5)]);
    }

    #[test]
    fn notification_aliases_bump_the_badge() {
        let (dispatcher, reconciler, view) = setup();
        let notification = |id| json!({"id": id, "type": "like", "entity_id": "3", "is_read": false});

        for (tag, id) in [("new_notification", 1), ("NEW_NOTIFICATION", 2), ("notification_created", 2)] {
            let frame = json!({"type": tag, "payload": notification(id)});
            assert_eq!(dispatcher.dispatch(&frame.to_string()), DispatchOutcome::Applied);
        }

        assert_eq!(reconciler.snapshot().unread_notifications, 2);
        assert!(view.updates().contains(&ViewUpdate::NotificationBadge(2)));
    }

    #[test]
    fn handler_failures_are_contained() {
        let (dispatcher, reconciler, _view) = setup();
        reconciler.set_viewer(None);
        let frame = json!({
            "type": "typing_status",
            "payload": {"sender_id": 2, "recipient_id": 1, "is_typing": true}
        });
        assert_eq!(dispatcher.dispatch(&frame.to_string()), DispatchOutcome::Failed);
    }

    #[test]
    fn heartbeat_frames_have_no_effect() {
        let (dispatcher, _reconciler, view) = setup();
        assert_eq!(dispatcher.dispatch(r#"{"type":"pong"}"#), DispatchOutcome::Applied);
        assert!(view.updates().is_empty());
    }
}
