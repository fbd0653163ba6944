//! Background WebSocket connection loop with auto-reconnect.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, error, info, warn};

use super::handler::{fail_pending, handle_server_frame};
use super::types::{PendingMap, RemoteStoreConfig, StoreCommand, SubscriptionMap};
use crate::protocol::{ClientFrame, ServerFrame};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// State shared between the handle and the connection task.
pub(crate) struct Shared {
    pub(crate) pending: PendingMap,
    pub(crate) subscriptions: SubscriptionMap,
    /// Set once the handle asks to disconnect; stops reconnecting.
    pub(crate) closing: Arc<AtomicBool>,
    pub(crate) next_ref: Arc<AtomicU64>,
}

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Background task managing the WebSocket connection with auto-reconnect.
pub(crate) async fn connection_loop(
    config: RemoteStoreConfig,
    connected: watch::Sender<bool>,
    command_tx: mpsc::Sender<StoreCommand>,
    command_rx: mpsc::Receiver<StoreCommand>,
    shared: Shared,
) {
    let command_rx = Arc::new(Mutex::new(command_rx));
    let mut reconnect_delay = config.reconnect_delay_secs;

    while !shared.closing.load(Ordering::SeqCst) {
        info!(url = %config.redacted_url(), "Connecting to store");

        match tokio::time::timeout(CONNECT_TIMEOUT, tokio_tungstenite::connect_async(&config.url))
            .await
        {
            Ok(Ok((ws_stream, _))) => {
                reconnect_delay = config.reconnect_delay_secs;

                let (ws_write, mut ws_read) = ws_stream.split();
                let ws_write = Arc::new(Mutex::new(ws_write));

                // Replay subscriptions before announcing the connection so
                // that consumers see fresh values first.
                {
                    let subs = shared.subscriptions.read().await;
                    for (sub, entry) in subs.iter() {
                        let frame = ClientFrame::Subscribe {
                            msg_ref: shared.next_ref.fetch_add(1, Ordering::Relaxed),
                            sub: *sub,
                            path: entry.path.clone(),
                        };
                        send_frame(&ws_write, &frame).await;
                    }
                }

                connected.send_replace(true);
                info!("Store connection established");

                let heartbeat_handle = tokio::spawn(heartbeat_task(
                    Arc::clone(&ws_write),
                    config.heartbeat_interval_secs,
                ));
                let cmd_handle = tokio::spawn(command_forwarder(
                    Arc::clone(&command_rx),
                    Arc::clone(&ws_write),
                    Arc::clone(&shared.closing),
                ));

                while let Some(msg_result) = ws_read.next().await {
                    match msg_result {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<ServerFrame>(&text) {
                                Ok(frame) => {
                                    handle_server_frame(
                                        frame,
                                        &shared.pending,
                                        &shared.subscriptions,
                                        &command_tx,
                                    )
                                    .await;
                                }
                                Err(e) => {
                                    debug!(error = %e, "Unrecognized frame from store");
                                }
                            }
                        }
                        Ok(WsMessage::Ping(data)) => {
                            let mut writer = ws_write.lock().await;
                            let _ = writer.send(WsMessage::Pong(data)).await;
                        }
                        Ok(WsMessage::Close(_)) => {
                            info!("Store closed connection");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "WebSocket error");
                            break;
                        }
                        _ => {}
                    }
                }

                // Cleanup.
                heartbeat_handle.abort();
                cmd_handle.abort();
                connected.send_replace(false);
                fail_pending(&shared.pending).await;
                drop_queued_writes(&command_rx).await;
                warn!("Store connection lost");
            }
            Ok(Err(e)) => {
                error!(error = %e, "Failed to connect to store");
            }
            Err(_elapsed) => {
                error!("Store connection timed out after {}s", CONNECT_TIMEOUT.as_secs());
            }
        }

        if shared.closing.load(Ordering::SeqCst) {
            break;
        }

        // Exponential backoff reconnect.
        info!(
            delay = reconnect_delay,
            "Reconnecting in {} seconds", reconnect_delay
        );
        tokio::time::sleep(Duration::from_secs(reconnect_delay)).await;
        reconnect_delay = (reconnect_delay * 2).min(config.max_reconnect_delay_secs);
    }

    info!("Store connection loop stopped");
}

/// Discard frames queued while the link was down. Writes are best-effort
/// and never replayed onto a later connection.
async fn drop_queued_writes(command_rx: &Arc<Mutex<mpsc::Receiver<StoreCommand>>>) {
    let mut rx = command_rx.lock().await;
    let mut dropped = 0usize;
    while let Ok(cmd) = rx.try_recv() {
        if matches!(cmd, StoreCommand::Send(_)) {
            dropped += 1;
        }
    }
    if dropped > 0 {
        debug!(dropped, "Dropped queued frames after disconnect");
    }
}

async fn send_frame<S>(ws_write: &Arc<Mutex<S>>, frame: &ClientFrame) -> bool
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    match serde_json::to_string(frame) {
        Ok(json) => {
            let mut writer = ws_write.lock().await;
            writer.send(WsMessage::Text(json.into())).await.is_ok()
        }
        Err(e) => {
            warn!(error = %e, "Failed to encode frame");
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Heartbeat
// ---------------------------------------------------------------------------

async fn heartbeat_task<S>(ws_write: Arc<Mutex<S>>, interval_secs: u64)
where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
    loop {
        interval.tick().await;
        if !send_frame(&ws_write, &ClientFrame::Heartbeat).await {
            break;
        }
    }
}

// ---------------------------------------------------------------------------
// Command Forwarder
// ---------------------------------------------------------------------------

async fn command_forwarder<S>(
    cmd_rx: Arc<Mutex<mpsc::Receiver<StoreCommand>>>,
    cmd_write: Arc<Mutex<S>>,
    closing: Arc<AtomicBool>,
) where
    S: futures_util::Sink<WsMessage> + Unpin,
{
    let mut rx = cmd_rx.lock().await;
    while let Some(cmd) = rx.recv().await {
        match cmd {
            StoreCommand::Send(frame) => {
                if !send_frame(&cmd_write, &frame).await {
                    break;
                }
            }
            StoreCommand::Disconnect => {
                closing.store(true, Ordering::SeqCst);
                let mut writer = cmd_write.lock().await;
                let _ = writer.send(WsMessage::Close(None)).await;
                return;
            }
        }
    }
}
