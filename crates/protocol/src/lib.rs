//! Wire protocol shared by the gateway and its WebSocket clients.
//!
//! Every frame is a JSON text message tagged by `type`:
//!
//! ```text
//! server → client   {"type":"hello","conn_id":"…","protocol":1}
//! client → server   {"type":"state-update","payload":{…}}
//! server → client   {"type":"state-update","payload":{…}}
//! server → client   {"type":"error","message":"…"}
//! ```
//!
//! The `state-update` payload is opaque: the relay passes it through untouched.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: u32 = 1;

/// Maximum accepted size of a single inbound text frame.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

// ── Frames ───────────────────────────────────────────────────────────────────

/// Frames a client may send to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ClientFrame {
    /// The sender's current playback state, mirrored to every other client.
    StateUpdate { payload: Value },
}

/// Frames the gateway sends to a client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerFrame {
    Hello { conn_id: String, protocol: u32 },
    StateUpdate { payload: Value },
    Error { message: String },
}

impl ServerFrame {
    pub fn hello(conn_id: impl Into<String>) -> Self {
        Self::Hello {
            conn_id: conn_id.into(),
            protocol: PROTOCOL_VERSION,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Serialize to the JSON text sent over the socket.
    pub fn to_text(&self) -> String {
        // Every variant is a plain map of strings and JSON values.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

impl ClientFrame {
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn parses_state_update() {
        let frame = ClientFrame::parse(
            r#"{"type":"state-update","payload":{"isPlaying":true,"track":{"name":"Song"}}}"#,
        )
        .unwrap();
        let ClientFrame::StateUpdate { payload } = frame;
        assert_eq!(payload["isPlaying"], true);
        assert_eq!(payload["track"]["name"], "Song");
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(ClientFrame::parse(r#"{"type":"track_info_updated","payload":{}}"#).is_err());
        assert!(ClientFrame::parse("not json").is_err());
    }

    #[test]
    fn server_frames_are_tagged() {
        let hello: Value = serde_json::from_str(&ServerFrame::hello("c1").to_text()).unwrap();
        assert_eq!(hello, json!({"type": "hello", "conn_id": "c1", "protocol": 1}));

        let update = ServerFrame::StateUpdate {
            payload: json!({"position": 42}),
        };
        let text: Value = serde_json::from_str(&update.to_text()).unwrap();
        assert_eq!(text["type"], "state-update");
        assert_eq!(text["payload"]["position"], 42);
    }
}
