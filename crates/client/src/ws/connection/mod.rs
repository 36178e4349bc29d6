//! WebSocket connection with state management and auto-reconnect.
//!
//! This module provides the shared types, the platform-independent session
//! loop, and conditionally includes the platform-specific socket connector.

use std::time::Duration;

use async_trait::async_trait;
use futures_channel::mpsc::{UnboundedReceiver, UnboundedSender};
use thiserror::Error;

mod lifecycle;

pub use lifecycle::{FrameCallback, StateCallback};
pub(crate) use lifecycle::{run_session, Command, SessionContext, SharedState};

/// Connection state for the live socket
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Closed,
    Connecting,
    Open,
    /// Waiting out the backoff before retry number `attempt`.
    Reconnecting { attempt: u32 },
    FailedPermanently,
}

impl ConnectionState {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }
}

/// Exponential backoff for reconnect attempts
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectPolicy {
    /// Retries after an unclean close before giving up
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry `attempt` (0-based): `min(initial * multiplier^attempt, max)`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt);
        let delay = self.initial_delay_ms.saturating_mul(factor);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Why the client is closing a socket on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    Logout,
    Superseded,
    Shutdown,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Logout => "logout",
            CloseReason::Superseded => "superseded",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// How a socket ended, as reported by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    /// The closing handshake completed (browser `wasClean`, or a close frame
    /// was received natively).
    pub clean: bool,
}

impl CloseInfo {
    pub const NORMAL: u16 = 1000;
    pub const ABNORMAL: u16 = 1006;

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self {
            code: Self::ABNORMAL,
            reason: reason.into(),
            clean: false,
        }
    }
}

/// Frame written by the session to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outgoing {
    Text(String),
    Close { code: u16, reason: String },
}

/// Event read from the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    Closed(CloseInfo),
}

/// An open socket, seen as a pair of channels.
///
/// Dropping `outgoing` closes the underlying socket.
pub struct Socket {
    pub outgoing: UnboundedSender<Outgoing>,
    pub incoming: UnboundedReceiver<SocketEvent>,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    #[error("invalid socket url: {0}")]
    InvalidUrl(String),
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("connect timed out")]
    Timeout,
}

#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection is not open")]
    NotOpen,
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("connection task has stopped")]
    ChannelClosed,
}

/// Opens sockets. One call per connection attempt; the manager never reuses a socket.
#[cfg_attr(not(target_arch = "wasm32"), async_trait)]
#[cfg_attr(target_arch = "wasm32", async_trait(?Send))]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Socket, TransportError>;
}

/// Handle for one connection lifecycle started by `ConnectionManager::open`.
#[derive(Clone, Debug)]
pub struct WsHandle {
    pub id: u64,
    commands: UnboundedSender<Command>,
}

impl WsHandle {
    pub(crate) fn new(id: u64, commands: UnboundedSender<Command>) -> Self {
        Self { id, commands }
    }

    pub(crate) fn send_text(&self, text: String) -> Result<(), SendError> {
        self.commands
            .unbounded_send(Command::Send(text))
            .map_err(|_| SendError::ChannelClosed)
    }

    pub(crate) fn close(&self, reason: CloseReason) {
        // The session may already be gone; nothing left to close then.
        let _ = self.commands.unbounded_send(Command::Close(reason));
    }

    /// True once the session behind this handle has ended.
    pub fn is_finished(&self) -> bool {
        self.commands.is_closed()
    }
}

// Include platform-specific implementation
#[cfg(target_arch = "wasm32")]
mod connection_wasm;
#[cfg(target_arch = "wasm32")]
pub use connection_wasm::BrowserConnector;

#[cfg(not(target_arch = "wasm32"))]
mod connection_native;
#[cfg(not(target_arch = "wasm32"))]
pub use connection_native::TungsteniteConnector;

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory connector driven by the test.

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use futures_channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
    use tokio::time::Instant;

    use super::*;

    /// The server side of one accepted socket.
    pub struct ServerEnd {
        pub sent: UnboundedReceiver<Outgoing>,
        pub push: UnboundedSender<SocketEvent>,
    }

    impl ServerEnd {
        pub fn frame(&self, text: &str) {
            let _ = self.push.unbounded_send(SocketEvent::Text(text.to_string()));
        }

        pub fn drop_unclean(&self) {
            let _ = self
                .push
                .unbounded_send(SocketEvent::Closed(CloseInfo::abnormal("reset")));
        }

        /// Texts written by the client so far.
        pub fn drain_texts(&mut self) -> Vec<String> {
            let mut out = Vec::new();
            while let Ok(Some(frame)) = self.sent.try_next() {
                if let Outgoing::Text(text) = frame {
                    out.push(text);
                }
            }
            out
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    pub enum Step {
        Accept,
        Refuse,
    }

    /// Plays back a script of accept/refuse outcomes; refuses once the script runs out.
    pub struct ScriptedConnector {
        script: Mutex<VecDeque<Step>>,
        connects: Mutex<Vec<(Instant, String)>>,
        accepted: UnboundedSender<ServerEnd>,
    }

    impl ScriptedConnector {
        pub fn new(script: &[Step]) -> (Self, UnboundedReceiver<ServerEnd>) {
            let (accepted, rx) = unbounded();
            let connector = Self {
                script: Mutex::new(script.iter().copied().collect()),
                connects: Mutex::new(Vec::new()),
                accepted,
            };
            (connector, rx)
        }

        pub fn connects(&self) -> Vec<(Instant, String)> {
            self.connects.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Connector for ScriptedConnector {
        async fn connect(&self, url: &str) -> Result<Socket, TransportError> {
            self.connects
                .lock()
                .unwrap()
                .push((Instant::now(), url.to_string()));
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Step::Refuse);
            match step {
                Step::Refuse => Err(TransportError::Connect("refused".into())),
                Step::Accept => {
                    let (out_tx, out_rx) = unbounded();
                    let (in_tx, in_rx) = unbounded();
                    let _ = self.accepted.unbounded_send(ServerEnd {
                        sent: out_rx,
                        push: in_tx,
                    });
                    Ok(Socket {
                        outgoing: out_tx,
                        incoming: in_rx,
                    })
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..5)
            .map(|i| policy.delay_for_attempt(i).as_millis() as u64)
            .collect();
        assert_eq!(delays, vec![1000, 2000, 4000, 8000, 16000]);
        assert_eq!(policy.delay_for_attempt(5), Duration::from_secs(30));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_secs(30));
    }
}
