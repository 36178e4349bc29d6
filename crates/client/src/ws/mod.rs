//! WebSocket module for real-time updates from the forum backend.
//!
//! This module provides:
//! - A single authoritative connection with heartbeat and auto-reconnect
//! - Platform connectors (tokio-tungstenite natively, `web_sys` in the browser)
//! - Raw text frames handed to a callback (see `sync::Dispatcher`)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                 ConnectionManager                   │
//! │   open(credential) / close / send / state           │
//! └─────────────────────────────────────────────────────┘
//!                         │ spawns one session per open
//!                         ▼
//!              ┌─────────────────────┐
//!              │   session loop      │  heartbeat, backoff,
//!              │   (lifecycle.rs)    │  logout flag
//!              └─────────────────────┘
//!                         │ Connector::connect
//!                         ▼
//!              ┌─────────────────────┐
//!              │  Socket (channels)  │
//!              └─────────────────────┘
//!                         │ on_frame(text)
//!                         ▼
//!              ┌─────────────────────┐
//!              │  Dispatcher → View  │
//!              └─────────────────────┘
//! ```

mod connection;
mod manager;

// Re-export connection types
pub use connection::{
    CloseInfo, CloseReason, ConnectionState, Connector, FrameCallback, Outgoing, ReconnectPolicy,
    SendError, Socket, SocketEvent, StateCallback, TransportError, WsHandle,
};

#[cfg(target_arch = "wasm32")]
pub use connection::BrowserConnector;
#[cfg(not(target_arch = "wasm32"))]
pub use connection::TungsteniteConnector;

pub use manager::{handshake_url, ConnectionManager};

#[cfg(test)]
pub(crate) use connection::testing;
