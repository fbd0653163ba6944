use serde::{Deserialize, Serialize};

/// Client-side settings for the realtime store connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// WebSocket URL of the store server.
    pub url: String,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// Transport keep-alive interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// How long a `get` or `increment` waits for its reply.
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7410/ws".into(),
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            heartbeat_interval_secs: 10,
            request_timeout_secs: 10,
        }
    }
}

/// Settings for the `calm-stored` server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// A connection silent for longer than this is treated as lost and its
    /// disconnect hooks fire.
    pub idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 7410,
            idle_timeout_secs: 30,
        }
    }
}
