//! Outbound notices from the session lifecycle to the admin channel.

use async_trait::async_trait;

use pb_domain::error::Result;
use pb_domain::{ChatId, PhoneNumber};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// `code` is already dash-grouped.
    PairingCode { phone: PhoneNumber, code: String },
    Connected { phone: PhoneNumber },
    ConnectFailed { phone: PhoneNumber, reason: String },
    PairingFailed { phone: PhoneNumber, reason: String },
}

impl SessionNotice {
    pub fn phone(&self) -> &PhoneNumber {
        match self {
            SessionNotice::PairingCode { phone, .. }
            | SessionNotice::Connected { phone }
            | SessionNotice::ConnectFailed { phone, .. }
            | SessionNotice::PairingFailed { phone, .. } => phone,
        }
    }
}

/// Delivers notices to a requesting chat.  Failures are logged by the
/// caller and never affect session state.
#[async_trait]
pub trait SessionNotifier: Send + Sync {
    async fn notify(&self, chat: ChatId, notice: SessionNotice) -> Result<()>;
}
