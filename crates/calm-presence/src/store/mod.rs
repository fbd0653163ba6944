//! The realtime key-value store collaborator.
//!
//! Presence components only talk to [`RealtimeStore`]; the backing store is
//! either in-process ([`MemoryStore`]) or remote ([`crate::realtime::RemoteStore`]).

mod memory;
pub mod path;

pub use memory::{MemoryClient, MemoryStore};

use async_trait::async_trait;
use calm_common::StoreError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{mpsc, watch};

/// Action the store applies on a client's behalf once its connection is
/// judged lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DisconnectAction {
    Set(Value),
    Remove,
}

impl DisconnectAction {
    /// Value written when the hook fires (`Null` removes).
    pub fn into_value(self) -> Value {
        match self {
            DisconnectAction::Set(value) => value,
            DisconnectAction::Remove => Value::Null,
        }
    }
}

/// Stream of values for a subscribed path.
///
/// Yields the current value immediately, then again after every change at
/// or below the path. `None` means nothing is stored there. Dropping the
/// receiver ends the subscription.
pub type Subscription = mpsc::UnboundedReceiver<Option<Value>>;

/// Capabilities required of the backing store.
///
/// Implementations serialize writes from one handle in submission order.
/// There are no transactions; read-then-write sequences are not atomic.
#[async_trait]
pub trait RealtimeStore: Send + Sync {
    /// Replace the value at `path`. `Value::Null` removes it.
    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError>;

    /// Read the value at `path` once.
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError>;

    async fn subscribe(&self, path: &str) -> Result<Subscription, StoreError>;

    /// Live connectivity to the store; `true` while connected.
    fn connection_state(&self) -> watch::Receiver<bool>;

    /// Arm a hook for `path`, replacing any earlier hook this handle armed
    /// for the same path.
    async fn on_disconnect(&self, path: &str, action: DisconnectAction) -> Result<(), StoreError>;

    async fn cancel_on_disconnect(&self, path: &str) -> Result<(), StoreError>;

    /// Atomically add `delta` to the integer at `path` (absent counts as 0)
    /// and return the new value.
    async fn increment(&self, path: &str, delta: i64) -> Result<i64, StoreError>;
}
