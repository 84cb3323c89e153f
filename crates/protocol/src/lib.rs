//! Bridge protocol: WebSocket messages exchanged with the messaging-network
//! sidecar.
//!
//! One WebSocket carries exactly one phone number's connection.  The client
//! opens it with `open`, then issues correlated requests (`request_id`) and
//! receives unsolicited `connection_update` messages as the network
//! connection progresses.

use serde::{Deserialize, Serialize};

/// Status code the sidecar reports on `close` when the device was logged
/// out (credentials revoked).  Every other close is transient.
pub const STATUS_LOGGED_OUT: u16 = 401;

pub const PROTOCOL_VERSION: u32 = 1;

/// WebSocket message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeMessage {
    /// Client → Sidecar: start a network connection for `phone`, reading and
    /// writing credentials under `auth_dir`.
    #[serde(rename = "open")]
    Open {
        protocol_version: u32,
        phone: String,
        auth_dir: String,
    },

    /// Client → Sidecar: ask the network for a pairing code.
    #[serde(rename = "request_pairing_code")]
    RequestPairingCode { request_id: String, phone: String },

    /// Client → Sidecar: send a text message to the connected account itself.
    #[serde(rename = "send_message")]
    SendMessage { request_id: String, text: String },

    /// Client → Sidecar: log the device out and revoke its credentials.
    #[serde(rename = "logout")]
    Logout { request_id: String },

    /// Sidecar → Client: connection state transition.
    #[serde(rename = "connection_update")]
    ConnectionUpdate {
        connection: ConnectionState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// Sidecar → Client: result of a correlated request.
    #[serde(rename = "response")]
    Response {
        request_id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<serde_json::Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Bidirectional: heartbeat.
    #[serde(rename = "ping")]
    Ping { timestamp: i64 },

    /// Bidirectional: heartbeat response.
    #[serde(rename = "pong")]
    Pong { timestamp: i64 },
}

/// Connection states reported by the sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Close,
}

impl BridgeMessage {
    /// Fresh correlation id for a request.
    pub fn new_request_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// The correlation id, for request and response variants.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            BridgeMessage::RequestPairingCode { request_id, .. }
            | BridgeMessage::SendMessage { request_id, .. }
            | BridgeMessage::Logout { request_id }
            | BridgeMessage::Response { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_update_wire_shape() {
        let json = r#"{"type":"connection_update","connection":"close","status_code":401}"#;
        let msg: BridgeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            msg,
            BridgeMessage::ConnectionUpdate {
                connection: ConnectionState::Close,
                status_code: Some(STATUS_LOGGED_OUT),
                reason: None,
            }
        );
    }

    #[test]
    fn optional_fields_are_omitted() {
        let msg = BridgeMessage::ConnectionUpdate {
            connection: ConnectionState::Open,
            status_code: None,
            reason: None,
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert_eq!(json, r#"{"type":"connection_update","connection":"open"}"#);
    }

    #[test]
    fn response_with_result() {
        let json = r#"{"type":"response","request_id":"r1","ok":true,"result":"ABCDEFGH"}"#;
        let msg: BridgeMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.request_id(), Some("r1"));
        match msg {
            BridgeMessage::Response { ok, result, .. } => {
                assert!(ok);
                assert_eq!(result, Some(serde_json::json!("ABCDEFGH")));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn request_ids_are_unique() {
        assert_ne!(BridgeMessage::new_request_id(), BridgeMessage::new_request_id());
    }
}
