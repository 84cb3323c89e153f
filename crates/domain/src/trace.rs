use serde::Serialize;

/// Structured trace events emitted across all PairBridge crates.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionInitiated {
        phone: String,
        generation: u64,
        has_requester: bool,
    },
    PairingCodeIssued {
        phone: String,
        chat_id: i64,
    },
    SessionOpened {
        phone: String,
        generation: u64,
        owner: Option<i64>,
    },
    SessionClosed {
        phone: String,
        generation: u64,
        logged_out: bool,
        reason: String,
    },
    ReconnectScheduled {
        phone: String,
        delay_ms: u64,
    },
    SessionTerminated {
        phone: String,
        chat_id: i64,
        remote_logout: bool,
    },
    OwnershipChanged {
        chat_id: i64,
        phone: Option<String>,
    },
    AccessChanged {
        set: &'static str,
        user_id: i64,
        added: bool,
    },
    DocumentSaved {
        key: String,
        bytes: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "pb_event");
    }
}
