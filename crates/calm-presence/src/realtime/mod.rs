//! WebSocket client for a `calm-stored` server.
//!
//! Implements [`crate::store::RealtimeStore`] over the frames in
//! [`crate::protocol`]. Handles keep-alive heartbeats, request/reply
//! correlation, subscription replay, and auto-reconnect with backoff.

mod client;
mod connection;
mod handler;
mod types;

pub use client::RemoteStore;
pub use types::RemoteStoreConfig;
