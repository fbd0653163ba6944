//! Per-connection handler: apply client frames to the shared store and
//! stream subscription values back.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Duration;

use calm_presence::store::{MemoryClient, MemoryStore, RealtimeStore};
use calm_presence::{ClientFrame, ServerFrame};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

/// Why a connection ended. Every reason fires the client's hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Closed,
    Error,
    IdleTimeout,
}

/// Handle a single WebSocket connection until it closes, errors, or its
/// idle lease runs out.
pub async fn handle_connection(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    addr: SocketAddr,
    store: MemoryStore,
    idle_timeout: Duration,
) {
    let conn_id = Uuid::new_v4();
    let (mut sink, mut stream) = ws.split();
    let client = store.client();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let mut forwarders: HashMap<u64, JoinHandle<()>> = HashMap::new();

    tracing::info!(peer = %addr, conn = %conn_id, client = client.id(), "Client connected");

    let lease = tokio::time::sleep(idle_timeout);
    tokio::pin!(lease);

    let reason = loop {
        tokio::select! {
            // Replies and subscription values → this client's WebSocket
            Some(frame) = out_rx.recv() => {
                if send_frame(&mut sink, &frame).await.is_err() {
                    break CloseReason::Error;
                }
            }

            frame = stream.next() => {
                lease.as_mut().reset(tokio::time::Instant::now() + idle_timeout);
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        handle_text(&text, &client, &store, &out_tx, &mut forwarders).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sink.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | None => break CloseReason::Closed,
                    Some(Err(e)) => {
                        tracing::debug!(peer = %addr, conn = %conn_id, error = %e, "WS error");
                        break CloseReason::Error;
                    }
                    _ => {}
                }
            }

            () = &mut lease => {
                tracing::warn!(
                    peer = %addr,
                    conn = %conn_id,
                    idle_secs = idle_timeout.as_secs_f64(),
                    "Idle lease expired"
                );
                break CloseReason::IdleTimeout;
            }
        }
    };

    // Cleanup.
    for (_, forwarder) in forwarders.drain() {
        forwarder.abort();
    }
    let fired = client.disconnect();
    let _ = sink.send(Message::Close(None)).await;

    tracing::info!(
        peer = %addr,
        conn = %conn_id,
        reason = ?reason,
        hooks_fired = fired,
        "Client disconnected"
    );
}

/// Decode one text frame and queue whatever it produces.
async fn handle_text(
    text: &str,
    client: &MemoryClient,
    store: &MemoryStore,
    out_tx: &mpsc::UnboundedSender<ServerFrame>,
    forwarders: &mut HashMap<u64, JoinHandle<()>>,
) {
    let frame = match serde_json::from_str::<ClientFrame>(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed client frame");
            // Answer the request if its ref is recoverable.
            if let Some(msg_ref) = serde_json::from_str::<Value>(text)
                .ok()
                .and_then(|v| v.get("ref").and_then(Value::as_u64))
            {
                let _ = out_tx.send(ServerFrame::error(msg_ref, format!("malformed frame: {e}")));
            }
            return;
        }
    };

    match frame {
        ClientFrame::Subscribe { msg_ref, sub, path } => {
            let reply = match store.watch(&path) {
                Ok(values) => {
                    if let Some(old) = forwarders.insert(sub, spawn_forwarder(sub, values, out_tx.clone())) {
                        old.abort();
                    }
                    ServerFrame::ok(msg_ref, None)
                }
                Err(e) => ServerFrame::error(msg_ref, e.to_string()),
            };
            let _ = out_tx.send(reply);
        }
        ClientFrame::Unsubscribe { sub } => {
            if let Some(forwarder) = forwarders.remove(&sub) {
                forwarder.abort();
            }
        }
        ClientFrame::Heartbeat => {}
        request => {
            let reply = apply_request(client, request).await;
            let _ = out_tx.send(reply);
        }
    }
}

/// Apply a request frame and build its reply.
async fn apply_request(client: &MemoryClient, frame: ClientFrame) -> ServerFrame {
    let msg_ref = frame.msg_ref().unwrap_or_default();
    let result = match frame {
        ClientFrame::Set { path, value, .. } => client.set(&path, value).await.map(|_| None),
        ClientFrame::Get { path, .. } => client.get(&path).await,
        ClientFrame::OnDisconnect { path, action, .. } => {
            client.on_disconnect(&path, action).await.map(|_| None)
        }
        ClientFrame::CancelOnDisconnect { path, .. } => {
            client.cancel_on_disconnect(&path).await.map(|_| None)
        }
        ClientFrame::Increment { path, delta, .. } => client
            .increment(&path, delta)
            .await
            .map(|n| Some(Value::from(n))),
        ClientFrame::Subscribe { .. } | ClientFrame::Unsubscribe { .. } | ClientFrame::Heartbeat => {
            Ok(None)
        }
    };
    match result {
        Ok(value) => ServerFrame::ok(msg_ref, value),
        Err(e) => ServerFrame::error(msg_ref, e.to_string()),
    }
}

/// Forward a store watch to the connection's outgoing queue.
fn spawn_forwarder(
    sub: u64,
    mut values: calm_presence::Subscription,
    out_tx: mpsc::UnboundedSender<ServerFrame>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(value) = values.recv().await {
            if out_tx.send(ServerFrame::Value { sub, value }).is_err() {
                return;
            }
        }
    })
}

/// Send a ServerFrame as a JSON text frame.
async fn send_frame(
    sink: &mut futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
        Message,
    >,
    frame: &ServerFrame,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    match serde_json::to_string(frame) {
        Ok(json) => sink.send(Message::Text(json.into())).await,
        Err(e) => {
            tracing::warn!(error = %e, "Failed to encode frame");
            Ok(())
        }
    }
}
