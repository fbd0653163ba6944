//! Accept loop.

use std::time::Duration;

use calm_presence::store::MemoryStore;
use tokio::net::TcpListener;
use tokio_tungstenite::accept_async;

use crate::connection::handle_connection;

/// Accept WebSocket clients forever, one task per connection.
pub async fn serve(listener: TcpListener, store: MemoryStore, idle_timeout: Duration) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let store = store.clone();
                tokio::spawn(async move {
                    match accept_async(stream).await {
                        Ok(ws) => handle_connection(ws, addr, store, idle_timeout).await,
                        Err(e) => {
                            tracing::warn!(peer = %addr, error = %e, "WS handshake failed");
                        }
                    }
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "TCP accept error");
            }
        }
    }
}

/// Periodically log how much the store holds.
pub async fn report_loop(store: MemoryStore, every: Duration) {
    loop {
        tokio::time::sleep(every).await;
        let sessions = store
            .read(calm_presence::record::SESSIONS_ROOT)
            .ok()
            .flatten()
            .and_then(|v| v.as_object().map(|m| m.len()))
            .unwrap_or(0);
        tracing::debug!(
            sessions,
            armed_hooks = store.armed_hooks(),
            subscribers = store.subscriber_count(),
            "Store tick"
        );
    }
}
