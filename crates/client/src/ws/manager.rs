//! Owner of the single authoritative WebSocket connection.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use forumsync_shared::ClientFrame;
use futures_channel::mpsc::unbounded;

use super::connection::{
    run_session, CloseReason, ConnectionState, Connector, FrameCallback, SendError,
    SessionContext, SharedState, StateCallback, TransportError, WsHandle,
};
use crate::config::ConnectionSettings;
use crate::rt;

/// Build the handshake URL carrying the credential as `token`.
pub fn handshake_url(ws_url: &str, credential: &str) -> Result<String, TransportError> {
    let mut url =
        url::Url::parse(ws_url).map_err(|e| TransportError::InvalidUrl(format!("{ws_url}: {e}")))?;
    url.query_pairs_mut().append_pair("token", credential);
    Ok(url.into())
}

/// Opens, supervises and closes the one live socket.
///
/// Every inbound text frame goes to `on_frame`; every state transition of the
/// current connection goes to `on_state`. Superseded connections are silent.
pub struct ConnectionManager {
    settings: ConnectionSettings,
    connector: Arc<dyn Connector>,
    on_frame: FrameCallback,
    on_state: StateCallback,
    shared: Arc<SharedState>,
    current: Mutex<Option<WsHandle>>,
}

impl ConnectionManager {
    pub fn new(
        settings: ConnectionSettings,
        connector: Arc<dyn Connector>,
        on_frame: impl Fn(String) + Send + Sync + 'static,
        on_state: impl Fn(ConnectionState) + Send + Sync + 'static,
    ) -> Self {
        Self {
            settings,
            connector,
            on_frame: Arc::new(on_frame),
            on_state: Arc::new(on_state),
            shared: Arc::new(SharedState::new()),
            current: Mutex::new(None),
        }
    }

    /// Start a connection for `credential`, closing any live one first.
    pub fn open(&self, credential: &str) -> Result<WsHandle, TransportError> {
        let url = handshake_url(&self.settings.ws_url, credential)?;

        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        let id = self.shared.begin_generation();
        if let Some(previous) = current.take() {
            crate::log_info!("Closing connection {} superseded by {}", previous.id, id);
            previous.close(CloseReason::Superseded);
        }

        let (commands, receiver) = unbounded();
        let handle = WsHandle::new(id, commands);
        let ctx = SessionContext {
            id,
            url,
            settings: self.settings.clone(),
            connector: self.connector.clone(),
            shared: self.shared.clone(),
            on_frame: self.on_frame.clone(),
            on_state: self.on_state.clone(),
        };
        rt::spawn(run_session(ctx, receiver));

        *current = Some(handle.clone());
        Ok(handle)
    }

    /// Close the connection behind `handle`, cancelling any pending reconnect.
    pub fn close(&self, handle: &WsHandle, reason: CloseReason) {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        if current.as_ref().is_some_and(|c| c.id == handle.id) {
            *current = None;
        }
        handle.close(reason);
    }

    pub fn close_current(&self, reason: CloseReason) {
        let previous = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = previous {
            handle.close(reason);
        }
    }

    /// The next close of the current connection will not trigger a reconnect.
    pub fn mark_intentional_logout(&self) {
        self.shared.mark_intentional_logout();
    }

    /// Send a frame over the current connection. Rejected unless that
    /// connection's own socket is open.
    pub fn send(&self, frame: &ClientFrame) -> Result<(), SendError> {
        let text = frame.to_text()?;
        let current = self.current.lock().unwrap_or_else(PoisonError::into_inner);
        match current.as_ref() {
            Some(handle) if self.shared.is_open_session(handle.id) => handle.send_text(text),
            _ => Err(SendError::NotOpen),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    pub fn last_opened(&self) -> Option<DateTime<Utc>> {
        self.shared.last_opened()
    }

    pub fn current_handle(&self) -> Option<WsHandle> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.close_current(CloseReason::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_channel::mpsc::UnboundedReceiver;
    use futures_util::StreamExt;
    use tokio::time::Instant;

    use super::*;
    use crate::ws::connection::testing::{ScriptedConnector, ServerEnd, Step};
    use crate::ws::connection::Outgoing;

    const PING: &str = r#"{"type":"ping"}"#;

    /// Paused-clock durations, rounded to 10ms.
    fn round_ms(d: Duration) -> u64 {
        ((d.as_millis() as u64) + 5) / 10 * 10
    }

    struct Harness {
        manager: ConnectionManager,
        connector: Arc<ScriptedConnector>,
        servers: UnboundedReceiver<ServerEnd>,
        states: UnboundedReceiver<ConnectionState>,
        frames: UnboundedReceiver<String>,
    }

    impl Harness {
        fn new(script: &[Step]) -> Self {
            Self::with_settings(script, ConnectionSettings::default())
        }

        fn with_settings(script: &[Step], settings: ConnectionSettings) -> Self {
            let (connector, servers) = ScriptedConnector::new(script);
            let connector = Arc::new(connector);
            let (state_tx, states) = unbounded();
            let (frame_tx, frames) = unbounded();
            let manager = ConnectionManager::new(
                settings,
                connector.clone(),
                move |text| {
                    let _ = frame_tx.unbounded_send(text);
                },
                move |state| {
                    let _ = state_tx.unbounded_send(state);
                },
            );
            Self {
                manager,
                connector,
                servers,
                states,
                frames,
            }
        }

        async fn wait_for(&mut self, target: ConnectionState) {
            while let Some(state) = self.states.next().await {
                if state == target {
                    return;
                }
            }
            panic!("state stream ended before {target:?}");
        }

        async fn open_and_accept(&mut self, credential: &str) -> ServerEnd {
            self.manager.open(credential).unwrap();
            self.wait_for(ConnectionState::Open).await;
            self.servers.next().await.unwrap()
        }
    }

    #[test]
    fn handshake_carries_token() {
        assert_eq!(
            handshake_url("ws://localhost:8080/ws", "a b").unwrap(),
            "ws://localhost:8080/ws?token=a+b"
        );
        assert!(matches!(
            handshake_url("not a url", "t"),
            Err(TransportError::InvalidUrl(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn pings_every_heartbeat_while_open() {
        let mut h = Harness::new(&[Step::Accept]);
        let mut server = h.open_and_accept("tok").await;

        tokio::time::sleep(Duration::from_secs(95)).await;

        assert_eq!(server.drain_texts(), vec![PING.to_string(); 3]);
        // No pong traffic at all, still open.
        assert_eq!(h.manager.state(), ConnectionState::Open);
        assert!(h.manager.last_opened().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_schedule_then_permanent_failure() {
        let mut h = Harness::new(&[Step::Accept]);
        let server = h.open_and_accept("tok").await;

        server.drop_unclean();
        h.wait_for(ConnectionState::FailedPermanently).await;

        let connects = h.connector.connects();
        assert_eq!(connects.len(), 6, "initial connect plus five retries");
        let gaps: Vec<u64> = connects
            .windows(2)
            .map(|w| round_ms(w[1].0 - w[0].0))
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000, 16000]);

        // Nothing further is scheduled.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(h.connector.connects().len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn intentional_logout_suppresses_reconnect() {
        let mut h = Harness::new(&[Step::Accept, Step::Accept]);
        let server = h.open_and_accept("tok").await;

        h.manager.mark_intentional_logout();
        server.drop_unclean();
        h.wait_for(ConnectionState::Closed).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.connects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn logout_flag_does_not_leak_into_next_cycle() {
        let mut h = Harness::new(&[Step::Accept, Step::Accept, Step::Accept]);
        let first = h.open_and_accept("tok").await;

        h.manager.mark_intentional_logout();
        first.drop_unclean();
        h.wait_for(ConnectionState::Closed).await;

        let second = h.open_and_accept("tok").await;
        second.drop_unclean();
        h.wait_for(ConnectionState::Reconnecting { attempt: 1 }).await;
        h.wait_for(ConnectionState::Open).await;
        assert_eq!(h.connector.connects().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resets_attempts_after_success() {
        let mut h = Harness::new(&[Step::Accept, Step::Refuse, Step::Accept]);
        let first = h.open_and_accept("tok").await;

        first.drop_unclean();
        h.wait_for(ConnectionState::Reconnecting { attempt: 2 }).await;
        h.wait_for(ConnectionState::Open).await;
        let second = h.servers.next().await.unwrap();

        second.drop_unclean();
        // Counting starts over: first retry again.
        h.wait_for(ConnectionState::Reconnecting { attempt: 1 }).await;
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_pending_reconnect() {
        let mut h = Harness::new(&[Step::Accept]);
        let server = h.open_and_accept("tok").await;

        server.drop_unclean();
        h.wait_for(ConnectionState::Reconnecting { attempt: 1 }).await;
        h.manager.close_current(CloseReason::Logout);
        h.wait_for(ConnectionState::Closed).await;

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.connects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn clean_server_close_does_not_reconnect() {
        let mut h = Harness::new(&[Step::Accept]);
        let server = h.open_and_accept("tok").await;

        let _ = server.push.unbounded_send(crate::ws::SocketEvent::Closed(
            crate::ws::CloseInfo {
                code: 1000,
                reason: "bye".into(),
                clean: true,
            },
        ));
        h.wait_for(ConnectionState::Closed).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.connector.connects().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn new_open_supersedes_live_connection() {
        let mut h = Harness::new(&[Step::Accept, Step::Accept]);
        let mut first = h.open_and_accept("old").await;
        let mut second = h.open_and_accept("new").await;

        assert_eq!(
            first.sent.next().await,
            Some(Outgoing::Close {
                code: 1000,
                reason: "superseded".into()
            })
        );

        h.manager.send(&ClientFrame::Ping).unwrap();
        assert_eq!(second.sent.next().await, Some(Outgoing::Text(PING.to_string())));
        assert!(first.drain_texts().is_empty());

        let urls: Vec<String> = h.connector.connects().into_iter().map(|(_, u)| u).collect();
        assert!(urls[1].ends_with("token=new"));

        // Frames from the superseded socket are not delivered.
        first.frame(r#"{"type":"pong"}"#);
        second.frame(r#"{"type":"post_count_update","payload":{"postCount":4}}"#);
        let delivered = h.frames.next().await.unwrap();
        assert!(delivered.contains("post_count_update"));
    }

    #[tokio::test(start_paused = true)]
    async fn missed_pongs_drop_the_socket() {
        let settings = ConnectionSettings {
            max_missed_pongs: Some(2),
            ..ConnectionSettings::default()
        };
        let mut h = Harness::with_settings(&[Step::Accept, Step::Accept], settings);
        let start = Instant::now();
        let _server = h.open_and_accept("tok").await;

        h.wait_for(ConnectionState::Reconnecting { attempt: 1 }).await;
        assert_eq!(round_ms(start.elapsed()), 90_000);
        h.wait_for(ConnectionState::Open).await;
        assert_eq!(h.connector.connects().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_are_rejected_unless_open() {
        let mut h = Harness::new(&[]);
        assert!(matches!(
            h.manager.send(&ClientFrame::Ping),
            Err(SendError::NotOpen)
        ));

        h.manager.open("tok").unwrap();
        h.wait_for(ConnectionState::Reconnecting { attempt: 1 }).await;
        assert!(matches!(
            h.manager.send(&ClientFrame::Message {
                content: "hi".into()
            }),
            Err(SendError::NotOpen)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn sends_right_after_reopen_wait_for_the_new_socket() {
        let mut h = Harness::new(&[Step::Accept, Step::Accept]);
        let _first = h.open_and_accept("old").await;

        h.manager.open("new").unwrap();
        assert_eq!(h.manager.state(), ConnectionState::Connecting);
        assert!(matches!(
            h.manager.send(&ClientFrame::Ping),
            Err(SendError::NotOpen)
        ));

        h.wait_for(ConnectionState::Open).await;
        let mut second = h.servers.next().await.unwrap();
        h.manager.send(&ClientFrame::Ping).unwrap();
        assert_eq!(second.sent.next().await, Some(Outgoing::Text(PING.to_string())));
    }
}
