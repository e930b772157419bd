//! Client configuration loaded from environment variables.
//!
//! Every setting has a default suitable for a local development backend.

use std::str::FromStr;
use std::time::Duration;

use courier_shared::constants::{
    ACK_MATCH_WINDOW_MS, DEFAULT_API_URL, DEFAULT_PAGE_SIZE, DEFAULT_REQUEST_TIMEOUT_SECS,
    DEFAULT_SOCKET_URL, TYPING_IDLE_TIMEOUT_MS,
};

/// Client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// REST API base URL.
    /// Env: `COURIER_API_URL`
    pub api_url: String,

    /// Push transport URL.
    /// Env: `COURIER_SOCKET_URL`
    pub socket_url: String,

    /// Messages requested per history page.
    /// Env: `COURIER_PAGE_SIZE`
    /// Default: `50`
    pub page_size: u32,

    /// Trailing window in which a send acknowledgement may claim an
    /// optimistic message.
    /// Env: `COURIER_ACK_WINDOW_MS`
    /// Default: `5000`
    pub ack_window_ms: i64,

    /// Keyboard inactivity before `typing:stop` is emitted.
    /// Env: `COURIER_TYPING_IDLE_MS`
    /// Default: `3000`
    pub typing_idle_ms: u64,

    /// Never let a message status move backwards.
    /// Env: `COURIER_MONOTONIC_STATUS` (true/false)
    /// Default: `false`
    pub monotonic_status: bool,

    /// Env: `COURIER_REQUEST_TIMEOUT_SECS`
    /// Default: `15`
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            socket_url: DEFAULT_SOCKET_URL.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            ack_window_ms: ACK_MATCH_WINDOW_MS,
            typing_idle_ms: TYPING_IDLE_TIMEOUT_MS,
            monotonic_status: false,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl ClientConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("COURIER_API_URL") {
            config.api_url = url.trim_end_matches('/').to_string();
        }

        if let Some(url) = lookup("COURIER_SOCKET_URL") {
            config.socket_url = url;
        }

        parse_into(&lookup, "COURIER_PAGE_SIZE", &mut config.page_size);
        parse_into(&lookup, "COURIER_ACK_WINDOW_MS", &mut config.ack_window_ms);
        parse_into(&lookup, "COURIER_TYPING_IDLE_MS", &mut config.typing_idle_ms);
        parse_into(&lookup, "COURIER_REQUEST_TIMEOUT_SECS", &mut config.request_timeout_secs);

        if let Some(val) = lookup("COURIER_MONOTONIC_STATUS") {
            config.monotonic_status = val == "true" || val == "1";
        }

        if config.page_size == 0 {
            tracing::warn!("COURIER_PAGE_SIZE must be positive, using default");
            config.page_size = DEFAULT_PAGE_SIZE;
        }

        config
    }

    pub fn ack_window(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.ack_window_ms)
    }

    pub fn typing_idle(&self) -> Duration {
        Duration::from_millis(self.typing_idle_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn parse_into<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) {
    let Some(raw) = lookup(key) else {
        return;
    };
    match raw.trim().parse::<T>() {
        Ok(v) => *target = v,
        Err(_) => tracing::warn!(key, value = %raw, "Invalid value, using default"),
    }
}
