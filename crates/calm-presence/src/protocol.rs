//! Wire protocol between `RemoteStore` and `calm-stored`.
//!
//! Every WebSocket text frame carries one JSON object. Client frames are
//! tagged by `op`, server frames by `event`. Requests carry a `ref` that the
//! server echoes in its `reply`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::DisconnectAction;

/// Frames sent by a store client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientFrame {
    Set {
        #[serde(rename = "ref")]
        msg_ref: u64,
        path: String,
        value: Value,
    },
    Get {
        #[serde(rename = "ref")]
        msg_ref: u64,
        path: String,
    },
    /// Start streaming values for `path` tagged with the client-chosen `sub` id.
    Subscribe {
        #[serde(rename = "ref")]
        msg_ref: u64,
        sub: u64,
        path: String,
    },
    Unsubscribe {
        sub: u64,
    },
    OnDisconnect {
        #[serde(rename = "ref")]
        msg_ref: u64,
        path: String,
        action: DisconnectAction,
    },
    CancelOnDisconnect {
        #[serde(rename = "ref")]
        msg_ref: u64,
        path: String,
    },
    Increment {
        #[serde(rename = "ref")]
        msg_ref: u64,
        path: String,
        delta: i64,
    },
    /// Keep-alive; renews the connection's liveness lease.
    Heartbeat,
}

impl ClientFrame {
    /// The request ref, for frames that expect a reply.
    pub fn msg_ref(&self) -> Option<u64> {
        match self {
            ClientFrame::Set { msg_ref, .. }
            | ClientFrame::Get { msg_ref, .. }
            | ClientFrame::Subscribe { msg_ref, .. }
            | ClientFrame::OnDisconnect { msg_ref, .. }
            | ClientFrame::CancelOnDisconnect { msg_ref, .. }
            | ClientFrame::Increment { msg_ref, .. } => Some(*msg_ref),
            ClientFrame::Unsubscribe { .. } | ClientFrame::Heartbeat => None,
        }
    }
}

/// Frames sent by the store server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerFrame {
    Reply {
        #[serde(rename = "ref")]
        msg_ref: u64,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Current value of a subscribed path.
    Value {
        sub: u64,
        #[serde(default)]
        value: Option<Value>,
    },
}

impl ServerFrame {
    pub fn ok(msg_ref: u64, value: Option<Value>) -> Self {
        ServerFrame::Reply {
            msg_ref,
            ok: true,
            value,
            error: None,
        }
    }

    pub fn error(msg_ref: u64, error: impl Into<String>) -> Self {
        ServerFrame::Reply {
            msg_ref,
            ok: false,
            value: None,
            error: Some(error.into()),
        }
    }
}
