//! Configuration and shared state types for the remote store client.

use std::collections::HashMap;
use std::sync::Arc;

use calm_common::StoreError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};

use crate::protocol::ClientFrame;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Configuration for connecting to a `calm-stored` server.
#[derive(Clone)]
pub struct RemoteStoreConfig {
    /// WebSocket URL (e.g., "ws://127.0.0.1:7410/ws").
    pub url: String,
    /// Keep-alive interval in seconds.
    pub heartbeat_interval_secs: u64,
    /// Reconnect base delay in seconds.
    pub reconnect_delay_secs: u64,
    /// Maximum reconnect delay in seconds.
    pub max_reconnect_delay_secs: u64,
    /// How long a request waits for its reply.
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for RemoteStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteStoreConfig")
            .field("url", &self.redacted_url())
            .field("heartbeat_interval_secs", &self.heartbeat_interval_secs)
            .field("reconnect_delay_secs", &self.reconnect_delay_secs)
            .field("max_reconnect_delay_secs", &self.max_reconnect_delay_secs)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:7410/ws".into(),
            heartbeat_interval_secs: 10,
            reconnect_delay_secs: 1,
            max_reconnect_delay_secs: 30,
            request_timeout_secs: 10,
        }
    }
}

impl RemoteStoreConfig {
    /// URL without its query string, which may carry credentials.
    pub(crate) fn redacted_url(&self) -> &str {
        self.url.split('?').next().unwrap_or("")
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub(crate) type ReplyTx = oneshot::Sender<Result<Option<Value>, StoreError>>;

/// In-flight requests awaiting a `reply`, keyed by ref.
pub(crate) type PendingMap = Arc<Mutex<HashMap<u64, ReplyTx>>>;

/// A live subscription, replayed to the server after every reconnect.
pub(crate) struct SubEntry {
    pub(crate) path: String,
    pub(crate) tx: mpsc::UnboundedSender<Option<Value>>,
}

pub(crate) type SubscriptionMap = Arc<RwLock<HashMap<u64, SubEntry>>>;

/// Commands sent from the handle to the background connection task.
#[derive(Debug)]
pub(crate) enum StoreCommand {
    Send(ClientFrame),
    Disconnect,
}
