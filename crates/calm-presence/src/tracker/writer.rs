//! Ordered write queue for one tracker.
//!
//! Every store mutation a tracker makes goes through a single task, so the
//! store observes them in submission order even when the heartbeat, the
//! connection watcher, and `stop()` race.

use std::sync::Arc;

use calm_common::StoreError;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::store::{DisconnectAction, RealtimeStore};

#[derive(Debug)]
pub(crate) enum WriteOp {
    Set { path: String, value: Value },
    ArmHook { path: String, action: DisconnectAction },
    DisarmHook { path: String },
}

impl WriteOp {
    fn kind(&self) -> &'static str {
        match self {
            WriteOp::Set { .. } => "set",
            WriteOp::ArmHook { .. } => "arm_hook",
            WriteOp::DisarmHook { .. } => "disarm_hook",
        }
    }

    fn path(&self) -> &str {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::ArmHook { path, .. }
            | WriteOp::DisarmHook { path } => path,
        }
    }

    async fn apply(self, store: &dyn RealtimeStore) -> Result<(), StoreError> {
        match self {
            WriteOp::Set { path, value } => store.set(&path, value).await,
            WriteOp::ArmHook { path, action } => store.on_disconnect(&path, action).await,
            WriteOp::DisarmHook { path } => store.cancel_on_disconnect(&path).await,
        }
    }
}

/// Spawn the writer. It exits once every sender is dropped and the queue
/// is empty.
pub(crate) fn spawn_writer(
    store: Arc<dyn RealtimeStore>,
) -> (mpsc::UnboundedSender<WriteOp>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<WriteOp>();
    let handle = tokio::spawn(async move {
        while let Some(op) = rx.recv().await {
            let kind = op.kind();
            let path = op.path().to_string();
            match op.apply(store.as_ref()).await {
                Ok(()) => trace!(op = kind, path = %path, "Presence write applied"),
                // Best effort: a lost write is superseded by the next one
                // or by the disconnect hook.
                Err(e) => warn!(op = kind, path = %path, error = %e, "Presence write dropped"),
            }
        }
    });
    (tx, handle)
}
