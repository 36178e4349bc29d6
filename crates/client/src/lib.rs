//! Forumsync Client - real-time sync layer for the forum front end
//!
//! Keeps one authenticated WebSocket per page session alive, routes pushed
//! events to reconciliation handlers that patch the rendered view, and drives
//! the paginated lists (feed, notifications, suggestions, friends,
//! connections). Runs natively on tokio and in the browser under wasm.

#[macro_use]
pub mod logging;

pub mod api_client;
pub mod client;
pub mod config;
pub mod loader;
pub(crate) mod rt;
pub mod sync;
pub mod ws;

#[cfg(feature = "dioxus")]
pub mod stores;

pub use api_client::ApiClient;
pub use client::{Loaders, SyncClient};
pub use config::{ConnectionSettings, ListConfig, ListSettings, SyncConfig};
pub use loader::{LoadOutcome, PaginatedLoader, ScrollMetrics, Trigger};
pub use sync::{Dispatcher, MemoryView, Notice, Reconciler, ViewPort};
pub use ws::{ConnectionManager, ConnectionState, ReconnectPolicy};
