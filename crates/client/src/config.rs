//! Client configuration.
//!
//! Defaults point at a local forum backend. Native builds can override them
//! from the environment:
//! - `FORUMSYNC_WS_URL`: socket endpoint (default: `ws://localhost:8080/ws`)
//! - `FORUMSYNC_API_URL`: REST base URL (default: `http://localhost:8080`)
//! - `FORUMSYNC_HEARTBEAT_SECS`: ping interval (default: 30)
//! - `FORUMSYNC_MAX_MISSED_PONGS`: close after this many unanswered pings (default: unset)

use std::time::Duration;

use crate::ws::ReconnectPolicy;

/// Settings for the single live socket.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    pub ws_url: String,
    pub heartbeat_interval: Duration,
    pub reconnect: ReconnectPolicy,
    /// `None` keeps the socket open regardless of pong traffic.
    pub max_missed_pongs: Option<u32>,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8080/ws".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect: ReconnectPolicy::default(),
            max_missed_pongs: None,
        }
    }
}

/// Page size and scroll threshold for one paginated list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ListSettings {
    pub page_size: u32,
    /// Distance to the bottom (px) at which a scroll triggers the next page.
    pub scroll_threshold_px: f64,
}

impl ListSettings {
    pub const fn new(page_size: u32, scroll_threshold_px: f64) -> Self {
        Self {
            page_size,
            scroll_threshold_px,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListConfig {
    pub feed: ListSettings,
    pub notifications: ListSettings,
    pub suggestions: ListSettings,
    pub friends: ListSettings,
    pub connections: ListSettings,
    /// Chat history; the threshold is measured from the top.
    pub conversation: ListSettings,
    pub user_search: ListSettings,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            feed: ListSettings::new(10, 100.0),
            notifications: ListSettings::new(10, 100.0),
            suggestions: ListSettings::new(5, 50.0),
            friends: ListSettings::new(10, 100.0),
            connections: ListSettings::new(10, 100.0),
            conversation: ListSettings::new(20, 100.0),
            user_search: ListSettings::new(5, 0.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SyncConfig {
    pub api_url: String,
    pub connection: ConnectionSettings,
    pub lists: ListConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8080".to_string(),
            connection: ConnectionSettings::default(),
            lists: ListConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Defaults overridden by `FORUMSYNC_*` environment variables.
    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup. Unparsable values are
    /// logged and the default is kept.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("FORUMSYNC_WS_URL") {
            config.connection.ws_url = url;
        }
        if let Some(url) = lookup("FORUMSYNC_API_URL") {
            config.api_url = url;
        }
        if let Some(secs) = parse_var::<u64>(&lookup, "FORUMSYNC_HEARTBEAT_SECS") {
            if secs == 0 {
                crate::log_warn!("FORUMSYNC_HEARTBEAT_SECS must be positive, keeping default");
            } else {
                config.connection.heartbeat_interval = Duration::from_secs(secs);
            }
        }
        if let Some(max) = parse_var::<u32>(&lookup, "FORUMSYNC_MAX_MISSED_PONGS") {
            config.connection.max_missed_pongs = (max > 0).then_some(max);
        }

        config
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            crate::log_warn!("Ignoring invalid {}={:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_from_lookup() {
        let vars: HashMap<&str, &str> = [
            ("FORUMSYNC_WS_URL", "wss://forum.example/ws"),
            ("FORUMSYNC_HEARTBEAT_SECS", "10"),
            ("FORUMSYNC_MAX_MISSED_PONGS", "3"),
        ]
        .into_iter()
        .collect();

        let config = SyncConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.connection.ws_url, "wss://forum.example/ws");
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(10));
        assert_eq!(config.connection.max_missed_pongs, Some(3));
        assert_eq!(config.api_url, "http://localhost:8080");
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = SyncConfig::from_lookup(|k| match k {
            "FORUMSYNC_HEARTBEAT_SECS" => Some("soon".into()),
            "FORUMSYNC_MAX_MISSED_PONGS" => Some("0".into()),
            _ => None,
        });
        assert_eq!(config.connection.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.connection.max_missed_pongs, None);
    }
}
