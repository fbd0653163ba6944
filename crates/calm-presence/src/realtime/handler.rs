//! Incoming server frame dispatch.

use calm_common::StoreError;
use tokio::sync::mpsc;
use tracing::debug;

use super::types::{PendingMap, StoreCommand, SubscriptionMap};
use crate::protocol::{ClientFrame, ServerFrame};

/// Route one server frame to the waiting request or subscription.
pub(crate) async fn handle_server_frame(
    frame: ServerFrame,
    pending: &PendingMap,
    subscriptions: &SubscriptionMap,
    command_tx: &mpsc::Sender<StoreCommand>,
) {
    match frame {
        ServerFrame::Reply {
            msg_ref,
            ok,
            value,
            error,
        } => {
            let Some(reply_tx) = pending.lock().await.remove(&msg_ref) else {
                debug!(msg_ref, "Reply for unknown or expired request");
                return;
            };
            let result = if ok {
                Ok(value)
            } else {
                Err(StoreError::Rejected(
                    error.unwrap_or_else(|| "unknown error".to_string()),
                ))
            };
            let _ = reply_tx.send(result);
        }
        ServerFrame::Value { sub, value } => {
            let closed = match subscriptions.read().await.get(&sub) {
                Some(entry) => entry.tx.send(value).is_err(),
                None => {
                    debug!(sub, "Value for unknown subscription");
                    false
                }
            };
            if closed {
                subscriptions.write().await.remove(&sub);
                let _ = command_tx.try_send(StoreCommand::Send(ClientFrame::Unsubscribe { sub }));
                debug!(sub, "Subscription dropped by consumer");
            }
        }
    }
}

/// Fail every in-flight request after the connection is lost.
pub(crate) async fn fail_pending(pending: &PendingMap) {
    let drained: Vec<_> = pending.lock().await.drain().collect();
    for (_, reply_tx) in drained {
        let _ = reply_tx.send(Err(StoreError::Disconnected));
    }
}
