use std::time::Duration;

/// Failures talking to the sidecar.
#[derive(thiserror::Error, Debug)]
pub enum BridgeError {
    #[error("websocket: {0}")]
    WebSocket(String),
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(Duration),
    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },
    #[error("connection closed")]
    Closed,
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("serialize: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl From<tokio_tungstenite::tungstenite::Error> for BridgeError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        BridgeError::WebSocket(e.to_string())
    }
}
