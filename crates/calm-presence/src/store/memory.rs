//! In-process realtime store.
//!
//! `MemoryStore` owns the JSON tree, subscriber list, and armed disconnect
//! hooks. Each connected party gets a `MemoryClient`; disconnecting (or
//! dropping) a client fires the hooks it armed. `calm-stored` serves one of
//! these over WebSocket.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use calm_common::StoreError;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use super::path::{get_at, normalize, related, set_at, split_path};
use super::{DisconnectAction, RealtimeStore, Subscription};

struct Subscriber {
    segments: Vec<String>,
    tx: mpsc::UnboundedSender<Option<Value>>,
}

impl Subscriber {
    fn segment_refs(&self) -> Vec<&str> {
        self.segments.iter().map(String::as_str).collect()
    }
}

struct Inner {
    root: Value,
    subscribers: Vec<Subscriber>,
    /// Armed hooks per client, keyed by normalized path.
    hooks: HashMap<u64, BTreeMap<String, DisconnectAction>>,
}

impl Inner {
    fn apply(&mut self, segments: &[&str], value: Value) {
        // Per subscriber: `Some(old value)` when the write touches its path.
        let before: Vec<Option<Option<Value>>> = self
            .subscribers
            .iter()
            .map(|sub| {
                let sub_segments = sub.segment_refs();
                if related(&sub_segments, segments) {
                    Some(get_at(&self.root, &sub_segments).cloned())
                } else {
                    None
                }
            })
            .collect();

        set_at(&mut self.root, segments, value);

        let root = &self.root;
        let mut index = 0;
        self.subscribers.retain(|sub| {
            let old = &before[index];
            index += 1;
            let Some(old) = old else {
                return !sub.tx.is_closed();
            };
            let current = get_at(root, &sub.segment_refs()).cloned();
            if *old == current {
                return !sub.tx.is_closed();
            }
            sub.tx.send(current).is_ok()
        });
    }
}

/// Shared in-memory store. Cloning yields another handle to the same data.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    next_client: Arc<AtomicU64>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                root: Value::Object(Default::default()),
                subscribers: Vec::new(),
                hooks: HashMap::new(),
            })),
            next_client: Arc::new(AtomicU64::new(1)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Open a new connected client handle.
    pub fn client(&self) -> MemoryClient {
        let (connected, _) = watch::channel(true);
        MemoryClient {
            id: self.next_client.fetch_add(1, Ordering::Relaxed),
            store: self.clone(),
            connected,
        }
    }

    pub fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        let segments = split_path(path)?;
        self.lock().apply(&segments, value);
        Ok(())
    }

    pub fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        let segments = split_path(path)?;
        Ok(get_at(&self.lock().root, &segments).cloned())
    }

    pub fn watch(&self, path: &str) -> Result<Subscription, StoreError> {
        let segments = split_path(path)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        // Receiver is alive, so the initial send cannot fail.
        let _ = tx.send(get_at(&inner.root, &segments).cloned());
        inner.subscribers.push(Subscriber {
            segments: segments.iter().map(|s| s.to_string()).collect(),
            tx,
        });
        Ok(rx)
    }

    pub fn add(&self, path: &str, delta: i64) -> Result<i64, StoreError> {
        let segments = split_path(path)?;
        let mut inner = self.lock();
        let current = match get_at(&inner.root, &segments) {
            None => 0,
            Some(value) => value.as_i64().ok_or_else(|| {
                StoreError::Rejected(format!("value at {path} is not an integer"))
            })?,
        };
        let next = current.saturating_add(delta);
        inner.apply(&segments, Value::from(next));
        Ok(next)
    }

    /// Total number of armed hooks across all clients.
    pub fn armed_hooks(&self) -> usize {
        self.lock().hooks.values().map(BTreeMap::len).sum()
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn arm(&self, client: u64, path: &str, action: DisconnectAction) -> Result<(), StoreError> {
        let key = normalize(path)?;
        self.lock()
            .hooks
            .entry(client)
            .or_default()
            .insert(key, action);
        Ok(())
    }

    fn disarm(&self, client: u64, path: &str) -> Result<(), StoreError> {
        let key = normalize(path)?;
        let mut inner = self.lock();
        if let Some(hooks) = inner.hooks.get_mut(&client) {
            hooks.remove(&key);
            if hooks.is_empty() {
                inner.hooks.remove(&client);
            }
        }
        Ok(())
    }

    /// Apply and forget every hook armed by `client`. Returns how many fired.
    fn fire_hooks(&self, client: u64) -> usize {
        let mut inner = self.lock();
        let Some(hooks) = inner.hooks.remove(&client) else {
            return 0;
        };
        let fired = hooks.len();
        for (path, action) in hooks {
            let segments: Vec<&str> = path.split('/').collect();
            debug!(client, path = %path, "Firing disconnect hook");
            inner.apply(&segments, action.into_value());
        }
        fired
    }
}

/// One party's connection to a [`MemoryStore`].
pub struct MemoryClient {
    id: u64,
    store: MemoryStore,
    connected: watch::Sender<bool>,
}

impl MemoryClient {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    /// Simulate connection loss: fire this client's hooks and flip the
    /// connection state to `false`. Returns how many hooks fired.
    pub fn disconnect(&self) -> usize {
        if !self.is_connected() {
            return 0;
        }
        let fired = self.store.fire_hooks(self.id);
        self.connected.send_replace(false);
        info!(client = self.id, hooks = fired, "Client disconnected");
        fired
    }

    pub fn reconnect(&self) {
        if !self.is_connected() {
            self.connected.send_replace(true);
            info!(client = self.id, "Client reconnected");
        }
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        if self.is_connected() {
            self.store.fire_hooks(self.id);
        }
    }
}

#[async_trait]
impl RealtimeStore for MemoryClient {
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.write(path, value)
    }

    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.ensure_connected()?;
        self.store.read(path)
    }

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError> {
        self.store.watch(path)
    }

    fn connection_state(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }

    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.arm(self.id, path, action)
    }

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.store.disarm(self.id, path)
    }

    async fn increment(&self, path: &str, delta: i64) -> Result<i64, StoreError> {
        self.ensure_connected()?;
        self.store.add(path, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_then_get() {
        let store = MemoryStore::new();
        let client = store.client();
        client.set("sessions/a", json!({"status": "online"})).await.unwrap();
        assert_eq!(
            client.get("sessions").await.unwrap(),
            Some(json!({"a": {"status": "online"}}))
        );
        assert_eq!(client.get("sessions/b").await.unwrap(), None);
    }

    #[tokio::test]
    async fn invalid_path_is_rejected() {
        let client = MemoryStore::new().client();
        let err = client.set(".info/connected", json!(true)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn subscription_fires_immediately_and_on_change() {
        let store = MemoryStore::new();
        let client = store.client();
        let mut sub = client.subscribe("sessions").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), None);

        client.set("sessions/a", json!(1)).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Some(json!({"a": 1})));

        // Unrelated path does not notify.
        client.set("dailyStats/x", json!(1)).await.unwrap();
        // Identical rewrite does not notify.
        client.set("sessions/a", json!(1)).await.unwrap();
        client.set("sessions/a", Value::Null).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), None);
        assert!(sub.try_recv().is_err());
    }

    #[tokio::test]
    async fn only_touched_subscribers_are_notified() {
        let store = MemoryStore::new();
        let mut sessions = store.watch("sessions").unwrap();
        let mut one = store.watch("sessions/a").unwrap();
        let mut stats = store.watch("dailyStats").unwrap();
        for sub in [&mut sessions, &mut one, &mut stats] {
            assert_eq!(sub.recv().await.unwrap(), None);
        }

        store.write("sessions/a/status", json!("online")).unwrap();
        assert_eq!(
            sessions.recv().await.unwrap(),
            Some(json!({"a": {"status": "online"}}))
        );
        assert_eq!(one.recv().await.unwrap(), Some(json!({"status": "online"})));
        assert!(stats.try_recv().is_err());

        // Writing a parent that leaves this child unchanged stays quiet.
        store
            .write("sessions", json!({"a": {"status": "online"}, "b": 1}))
            .unwrap();
        assert_eq!(
            sessions.recv().await.unwrap(),
            Some(json!({"a": {"status": "online"}, "b": 1}))
        );
        assert!(one.try_recv().is_err());
        assert_eq!(store.subscriber_count(), 3);
    }

    #[tokio::test]
    async fn dropped_subscriptions_are_pruned() {
        let store = MemoryStore::new();
        let sub = store.watch("sessions").unwrap();
        assert_eq!(store.subscriber_count(), 1);
        drop(sub);
        store.write("sessions/a", json!(1)).unwrap();
        assert_eq!(store.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn disconnect_fires_armed_hooks() {
        let store = MemoryStore::new();
        let client = store.client();
        client.set("sessions/a", json!({"status": "online"})).await.unwrap();
        client
            .on_disconnect("sessions/a", DisconnectAction::Set(json!({"status": "offline"})))
            .await
            .unwrap();
        assert_eq!(store.armed_hooks(), 1);

        let mut state = client.connection_state();
        assert!(*state.borrow_and_update());
        assert_eq!(client.disconnect(), 1);
        assert!(!*state.borrow_and_update());

        assert_eq!(
            store.read("sessions/a").unwrap(),
            Some(json!({"status": "offline"}))
        );
        assert_eq!(store.armed_hooks(), 0);
        assert!(matches!(
            client.set("sessions/a", json!(1)).await,
            Err(StoreError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn rearming_replaces_and_cancel_disarms() {
        let store = MemoryStore::new();
        let client = store.client();
        client
            .on_disconnect("sessions/a", DisconnectAction::Set(json!(1)))
            .await
            .unwrap();
        client
            .on_disconnect("/sessions/a/", DisconnectAction::Set(json!(2)))
            .await
            .unwrap();
        assert_eq!(store.armed_hooks(), 1);

        client.cancel_on_disconnect("sessions/a").await.unwrap();
        assert_eq!(store.armed_hooks(), 0);
        assert_eq!(client.disconnect(), 0);
        assert_eq!(store.read("sessions/a").unwrap(), None);
    }

    #[tokio::test]
    async fn remove_hook_deletes_record() {
        let store = MemoryStore::new();
        let client = store.client();
        client.set("sessions/a", json!(1)).await.unwrap();
        client
            .on_disconnect("sessions/a", DisconnectAction::Remove)
            .await
            .unwrap();
        drop(client);
        assert_eq!(store.read("sessions/a").unwrap(), None);
    }

    #[tokio::test]
    async fn hooks_are_per_client() {
        let store = MemoryStore::new();
        let a = store.client();
        let b = store.client();
        a.on_disconnect("sessions/a", DisconnectAction::Set(json!("a-gone")))
            .await
            .unwrap();
        b.on_disconnect("sessions/b", DisconnectAction::Set(json!("b-gone")))
            .await
            .unwrap();
        b.disconnect();
        assert_eq!(store.read("sessions/a").unwrap(), None);
        assert_eq!(store.read("sessions/b").unwrap(), Some(json!("b-gone")));
    }

    #[tokio::test]
    async fn reconnect_restores_state() {
        let client = MemoryStore::new().client();
        client.disconnect();
        assert!(!client.is_connected());
        client.reconnect();
        assert!(client.is_connected());
        client.set("a", json!(1)).await.unwrap();
    }

    #[tokio::test]
    async fn increment_counts_from_zero() {
        let client = MemoryStore::new().client();
        assert_eq!(client.increment("counters/visits", 1).await.unwrap(), 1);
        assert_eq!(client.increment("counters/visits", 5).await.unwrap(), 6);
        client.set("counters/name", json!("x")).await.unwrap();
        assert!(matches!(
            client.increment("counters/name", 1).await,
            Err(StoreError::Rejected(_))
        ));
    }
}
