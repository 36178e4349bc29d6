//! The session loop behind one `ConnectionManager::open` call.
//!
//! A session connects, pumps frames and heartbeats while open, and after an
//! unclean close retries with backoff until it reconnects, is told to stop,
//! or runs out of attempts. A newer `open` bumps the generation; a superseded
//! session stops publishing state and frames.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use forumsync_shared::{ClientFrame, EventKind, RawFrame};
use futures_channel::mpsc::UnboundedReceiver;
use futures_util::{pin_mut, select, FutureExt, StreamExt};

use super::{CloseInfo, CloseReason, ConnectionState, Connector, Outgoing, Socket, SocketEvent, TransportError};
use crate::config::ConnectionSettings;
use crate::rt;

pub type FrameCallback = Arc<dyn Fn(String) + Send + Sync>;
pub type StateCallback = Arc<dyn Fn(ConnectionState) + Send + Sync>;

/// Close code used when the heartbeat gives up on the server.
const HEARTBEAT_TIMEOUT_CODE: u16 = 4000;

#[derive(Debug)]
pub(crate) enum Command {
    Send(String),
    Close(CloseReason),
}

/// State shared by the manager and every session it spawned.
pub(crate) struct SharedState {
    generation: AtomicU64,
    intentional_logout: AtomicBool,
    /// Session whose socket is currently open; 0 when none is.
    open_session: AtomicU64,
    state: Mutex<ConnectionState>,
    last_opened: Mutex<Option<DateTime<Utc>>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
            intentional_logout: AtomicBool::new(false),
            open_session: AtomicU64::new(0),
            state: Mutex::new(ConnectionState::Closed),
            last_opened: Mutex::new(None),
        }
    }

    /// Start a new authoritative session and forget any stale logout flag.
    /// Until the new session opens its socket, nothing counts as open.
    pub fn begin_generation(&self) -> u64 {
        self.intentional_logout.store(false, Ordering::SeqCst);
        self.open_session.store(0, Ordering::SeqCst);
        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = ConnectionState::Connecting;
        id
    }

    /// True once session `id` has published `Open` and not left it since.
    pub fn is_open_session(&self, id: u64) -> bool {
        self.open_session.load(Ordering::SeqCst) == id
    }

    pub fn is_current(&self, id: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == id
    }

    pub fn mark_intentional_logout(&self) {
        self.intentional_logout.store(true, Ordering::SeqCst);
    }

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_opened(&self) -> Option<DateTime<Utc>> {
        *self.last_opened.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub(crate) struct SessionContext {
    pub id: u64,
    pub url: String,
    pub settings: ConnectionSettings,
    pub connector: Arc<dyn Connector>,
    pub shared: Arc<SharedState>,
    pub on_frame: FrameCallback,
    pub on_state: StateCallback,
}

enum ConnectOutcome {
    Opened(Socket),
    Failed(TransportError),
    Cancelled(CloseReason),
}

enum SessionEnd {
    Requested(CloseReason),
    Remote(CloseInfo),
    Lost(String),
}

pub(crate) async fn run_session(ctx: SessionContext, mut commands: UnboundedReceiver<Command>) {
    let policy = ctx.settings.reconnect.clone();
    let mut attempt = 0u32;
    ctx.publish(ConnectionState::Connecting);

    loop {
        let end = match ctx.connect(&mut commands).await {
            ConnectOutcome::Opened(socket) => {
                attempt = 0;
                *ctx.shared
                    .last_opened
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(Utc::now());
                ctx.publish(ConnectionState::Open);
                crate::log_info!("WebSocket connected (session {})", ctx.id);
                ctx.run_open(socket, &mut commands).await
            }
            ConnectOutcome::Failed(err) => {
                crate::log_warn!("WebSocket connect failed (session {}): {}", ctx.id, err);
                SessionEnd::Lost(err.to_string())
            }
            ConnectOutcome::Cancelled(reason) => SessionEnd::Requested(reason),
        };

        let cause = match end {
            SessionEnd::Requested(reason) => {
                ctx.take_intentional_logout();
                crate::log_info!("WebSocket closed: {}", reason.as_str());
                ctx.publish(ConnectionState::Closed);
                return;
            }
            SessionEnd::Remote(info) if info.clean => {
                ctx.take_intentional_logout();
                crate::log_info!("WebSocket closed by server (code {})", info.code);
                ctx.publish(ConnectionState::Closed);
                return;
            }
            SessionEnd::Remote(info) => format!("code {} {}", info.code, info.reason),
            SessionEnd::Lost(reason) => reason,
        };

        if !ctx.is_current() {
            return;
        }
        if ctx.take_intentional_logout() {
            crate::log_info!("WebSocket dropped after logout ({}), not reconnecting", cause);
            ctx.publish(ConnectionState::Closed);
            return;
        }
        if attempt >= policy.max_attempts {
            crate::log_error!(
                "Max reconnect attempts ({}) exceeded, last error: {}",
                policy.max_attempts,
                cause
            );
            ctx.publish(ConnectionState::FailedPermanently);
            return;
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        crate::log_info!(
            "WebSocket lost ({}), reconnecting in {}ms (attempt {})",
            cause,
            delay.as_millis(),
            attempt
        );
        ctx.publish(ConnectionState::Reconnecting { attempt });

        if let Some(reason) = ctx.backoff(delay, &mut commands).await {
            ctx.take_intentional_logout();
            crate::log_info!("Pending reconnect cancelled: {}", reason.as_str());
            ctx.publish(ConnectionState::Closed);
            return;
        }
    }
}

impl SessionContext {
    fn is_current(&self) -> bool {
        self.shared.is_current(self.id)
    }

    fn publish(&self, state: ConnectionState) {
        if !self.is_current() {
            return;
        }
        let open = if state.is_open() { self.id } else { 0 };
        self.shared.open_session.store(open, Ordering::SeqCst);
        *self.shared.state.lock().unwrap_or_else(PoisonError::into_inner) = state.clone();
        crate::log_debug!("WebSocket state -> {:?}", state);
        (self.on_state)(state);
    }

    /// Consume the logout flag; only the authoritative session may do so.
    fn take_intentional_logout(&self) -> bool {
        self.is_current() && self.shared.intentional_logout.swap(false, Ordering::SeqCst)
    }

    async fn connect(&self, commands: &mut UnboundedReceiver<Command>) -> ConnectOutcome {
        let attempt = self.connector.connect(&self.url).fuse();
        pin_mut!(attempt);

        loop {
            select! {
                result = attempt => {
                    return match result {
                        Ok(socket) => ConnectOutcome::Opened(socket),
                        Err(err) => ConnectOutcome::Failed(err),
                    };
                }
                cmd = commands.next() => match cmd {
                    Some(Command::Send(_)) => {
                        crate::log_warn!("Dropping frame queued before the socket opened");
                    }
                    Some(Command::Close(reason)) => return ConnectOutcome::Cancelled(reason),
                    None => return ConnectOutcome::Cancelled(CloseReason::Shutdown),
                },
            }
        }
    }

    async fn run_open(&self, socket: Socket, commands: &mut UnboundedReceiver<Command>) -> SessionEnd {
        let Socket {
            outgoing,
            mut incoming,
        } = socket;

        let ping = match ClientFrame::Ping.to_text() {
            Ok(text) => text,
            Err(e) => return SessionEnd::Lost(format!("cannot encode ping: {e}")),
        };

        let interval = self.settings.heartbeat_interval;
        let heartbeat = rt::sleep(interval).fuse();
        pin_mut!(heartbeat);
        let mut pongs = PongTracker::new(self.settings.max_missed_pongs);

        loop {
            select! {
                () = heartbeat => {
                    if pongs.on_tick() {
                        crate::log_warn!("No pong for {} heartbeats, dropping socket", pongs.missed);
                        let _ = outgoing.unbounded_send(Outgoing::Close {
                            code: HEARTBEAT_TIMEOUT_CODE,
                            reason: "heartbeat timeout".to_string(),
                        });
                        return SessionEnd::Lost("heartbeat timeout".to_string());
                    }
                    if outgoing.unbounded_send(Outgoing::Text(ping.clone())).is_err() {
                        return SessionEnd::Lost("socket writer stopped".to_string());
                    }
                    heartbeat.set(rt::sleep(interval).fuse());
                }
                event = incoming.next() => match event {
                    Some(SocketEvent::Text(text)) => {
                        pongs.observe(&text);
                        if self.is_current() {
                            (self.on_frame)(text);
                        }
                    }
                    Some(SocketEvent::Closed(info)) => return SessionEnd::Remote(info),
                    None => return SessionEnd::Remote(CloseInfo::abnormal("socket dropped")),
                },
                cmd = commands.next() => match cmd {
                    Some(Command::Send(text)) => {
                        if outgoing.unbounded_send(Outgoing::Text(text)).is_err() {
                            return SessionEnd::Lost("socket writer stopped".to_string());
                        }
                    }
                    Some(Command::Close(reason)) => {
                        close_normally(&outgoing, reason);
                        return SessionEnd::Requested(reason);
                    }
                    None => {
                        close_normally(&outgoing, CloseReason::Shutdown);
                        return SessionEnd::Requested(CloseReason::Shutdown);
                    }
                },
            }
        }
    }

    /// Sleep out a reconnect delay. Returns the reason if a close arrives first.
    async fn backoff(
        &self,
        delay: Duration,
        commands: &mut UnboundedReceiver<Command>,
    ) -> Option<CloseReason> {
        let timer = rt::sleep(delay).fuse();
        pin_mut!(timer);

        loop {
            select! {
                () = timer => return None,
                cmd = commands.next() => match cmd {
                    Some(Command::Send(_)) => {
                        crate::log_warn!("Dropping frame queued while reconnecting");
                    }
                    Some(Command::Close(reason)) => return Some(reason),
                    None => return Some(CloseReason::Shutdown),
                },
            }
        }
    }
}

fn close_normally(outgoing: &futures_channel::mpsc::UnboundedSender<Outgoing>, reason: CloseReason) {
    let _ = outgoing.unbounded_send(Outgoing::Close {
        code: CloseInfo::NORMAL,
        reason: reason.as_str().to_string(),
    });
}

/// Counts heartbeats that went out without a `pong` coming back.
struct PongTracker {
    max_missed: Option<u32>,
    awaiting: bool,
    missed: u32,
}

impl PongTracker {
    fn new(max_missed: Option<u32>) -> Self {
        Self {
            max_missed,
            awaiting: false,
            missed: 0,
        }
    }

    /// Called when a heartbeat is due. True means the limit was reached.
    fn on_tick(&mut self) -> bool {
        let Some(max) = self.max_missed else {
            return false;
        };
        if self.awaiting {
            self.missed += 1;
        }
        if self.missed >= max {
            return true;
        }
        self.awaiting = true;
        false
    }

    fn observe(&mut self, text: &str) {
        if self.max_missed.is_none() {
            return;
        }
        let is_pong = RawFrame::parse(text)
            .map(|frame| frame.kind() == Some(EventKind::Pong))
            .unwrap_or(false);
        if is_pong {
            self.awaiting = false;
            self.missed = 0;
        }
    }
}
