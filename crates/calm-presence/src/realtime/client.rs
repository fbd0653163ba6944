//! Public handle for a remote realtime store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use calm_common::StoreError;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tracing::debug;

use super::connection::{connection_loop, Shared};
use super::types::{PendingMap, RemoteStoreConfig, StoreCommand, SubEntry, SubscriptionMap};
use crate::protocol::ClientFrame;
use crate::store::{path, DisconnectAction, RealtimeStore, Subscription};

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Handle for a `calm-stored` server connection.
///
/// The connection runs in a background task with auto-reconnect. Requests
/// made while disconnected fail fast with `StoreError::Disconnected`;
/// subscriptions survive reconnects.
pub struct RemoteStore {
    command_tx: mpsc::Sender<StoreCommand>,
    connected: watch::Receiver<bool>,
    pending: PendingMap,
    subscriptions: SubscriptionMap,
    closing: Arc<AtomicBool>,
    next_ref: Arc<AtomicU64>,
    request_timeout: Duration,
}

impl RemoteStore {
    /// Create a new client and start the background connection.
    pub fn connect(config: RemoteStoreConfig) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let (connected_tx, connected_rx) = watch::channel(false);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let subscriptions: SubscriptionMap = Arc::new(RwLock::new(HashMap::new()));
        let closing = Arc::new(AtomicBool::new(false));
        let next_ref = Arc::new(AtomicU64::new(1));
        let request_timeout = Duration::from_secs(config.request_timeout_secs.max(1));

        let shared = Shared {
            pending: Arc::clone(&pending),
            subscriptions: Arc::clone(&subscriptions),
            closing: Arc::clone(&closing),
            next_ref: Arc::clone(&next_ref),
        };
        tokio::spawn(connection_loop(
            config,
            connected_tx,
            command_tx.clone(),
            command_rx,
            shared,
        ));

        Self {
            command_tx,
            connected: connected_rx,
            pending,
            subscriptions,
            closing,
            next_ref,
            request_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Wait until the connection is up, or `timeout` elapses.
    pub async fn wait_connected(&self, timeout: Duration) -> bool {
        let mut state = self.connected.clone();
        tokio::time::timeout(timeout, state.wait_for(|up| *up))
            .await
            .map(|r| r.is_ok())
            .unwrap_or(false)
    }

    /// Close the connection and stop reconnecting.
    pub async fn disconnect(&self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.command_tx.send(StoreCommand::Disconnect).await;
    }

    fn next_ref(&self) -> u64 {
        self.next_ref.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a frame built around a fresh ref and wait for its reply.
    async fn request<F>(&self, build: F) -> Result<Option<Value>, StoreError>
    where
        F: FnOnce(u64) -> ClientFrame,
    {
        if !self.is_connected() {
            return Err(StoreError::Disconnected);
        }
        let msg_ref = self.next_ref();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().await.insert(msg_ref, reply_tx);

        if self
            .command_tx
            .send(StoreCommand::Send(build(msg_ref)))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&msg_ref);
            return Err(StoreError::Disconnected);
        }

        match tokio::time::timeout(self.request_timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(StoreError::Disconnected),
            Err(_) => {
                self.pending.lock().await.remove(&msg_ref);
                Err(StoreError::Timeout(self.request_timeout.as_secs()))
            }
        }
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        let _ = self.command_tx.try_send(StoreCommand::Disconnect);
    }
}

#[async_trait]
impl RealtimeStore for RemoteStore {
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let path = path::normalize(path)?;
        self.request(|msg_ref| ClientFrame::Set {
            msg_ref,
            path,
            value,
        })
        .await
        .map(|_| ())
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let path = path::normalize(path)?;
        self.request(|msg_ref| ClientFrame::Get { msg_ref, path })
            .await
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        let path = path::normalize(path)?;
        let sub = self.next_ref();
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriptions.write().await.insert(
            sub,
            SubEntry {
                path: path.clone(),
                tx,
            },
        );

        // While disconnected the subscription is replayed on reconnect.
        if self.is_connected() {
            if let Err(e) = self
                .request(|msg_ref| ClientFrame::Subscribe { msg_ref, sub, path })
                .await
            {
                debug!(sub, error = %e, "Subscribe deferred until reconnect");
            }
        }
        Ok(rx)
    }

    fn connection_state(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), StoreError> {
        let path = path::normalize(path)?;
        self.request(|msg_ref| ClientFrame::OnDisconnect {
            msg_ref,
            path,
            action,
        })
        .await
        .map(|_| ())
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        let path = path::normalize(path)?;
        self.request(|msg_ref| ClientFrame::CancelOnDisconnect { msg_ref, path })
            .await
            .map(|_| ())
    }

    async fn increment(&self, path: &str, delta: i64) -> Result<i64, StoreError> {
        let path = path::normalize(path)?;
        let value = self
            .request(|msg_ref| ClientFrame::Increment {
                msg_ref,
                path,
                delta,
            })
            .await?;
        value
            .and_then(|v| v.as_i64())
            .ok_or_else(|| StoreError::Rejected("increment reply carried no integer".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unreachable_config() -> RemoteStoreConfig {
        RemoteStoreConfig {
            // Port 9 (discard) on localhost is closed in test environments.
            url: "ws://127.0.0.1:9/ws".into(),
            reconnect_delay_secs: 60,
            max_reconnect_delay_secs: 60,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn requests_fail_fast_while_disconnected() {
        let store = RemoteStore::connect(unreachable_config());
        assert!(!store.is_connected());
        let err = store.set("sessions/a", Value::Null).await.unwrap_err();
        assert!(matches!(err, StoreError::Disconnected));
        let err = store.get("sessions").await.unwrap_err();
        assert!(matches!(err, StoreError::Disconnected));
    }

    #[tokio::test]
    async fn invalid_path_checked_before_connection() {
        let store = RemoteStore::connect(unreachable_config());
        let err = store.get("a/.b").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn subscribe_while_disconnected_is_kept_for_replay() {
        let store = RemoteStore::connect(unreachable_config());
        let _rx = store.subscribe("sessions").await.unwrap();
        assert_eq!(store.subscriptions.read().await.len(), 1);
        assert!(!*store.connection_state().borrow());
    }
}
