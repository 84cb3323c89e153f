use std::sync::Arc;

use async_trait::async_trait;

use pb_domain::error::Result;
use pb_domain::ChatId;
use pb_sessions::{SessionNotice, SessionNotifier};

use crate::transport::{AdminTransport, OutgoingMessage};

/// Renders session notices as admin-channel messages.
pub struct TransportNotifier {
    transport: Arc<dyn AdminTransport>,
}

impl TransportNotifier {
    pub fn new(transport: Arc<dyn AdminTransport>) -> Self {
        Self { transport }
    }
}

pub fn render(chat: ChatId, notice: &SessionNotice) -> OutgoingMessage {
    match notice {
        SessionNotice::PairingCode { phone, code } => OutgoingMessage::markdown(
            chat,
            format!(
                "┌──────┤ Pairing Code ├──────┐\n│➻ Number: {phone}\n│➻ Code: *{code}*\n└────────────────────────┘"
            ),
        ),
        SessionNotice::Connected { phone } => {
            OutgoingMessage::markdown(chat, format!("✅ The number *{phone}* is connected."))
        }
        SessionNotice::ConnectFailed { phone, .. } => {
            OutgoingMessage::text(chat, format!("❌ Failed to initialize {phone}."))
        }
        SessionNotice::PairingFailed { phone, .. } => OutgoingMessage::text(
            chat,
            format!("❌ Could not get a pairing code for {phone}. Send /reqpair again to retry."),
        ),
    }
}

#[async_trait]
impl SessionNotifier for TransportNotifier {
    async fn notify(&self, chat: ChatId, notice: SessionNotice) -> Result<()> {
        self.transport.send(render(chat, &notice)).await
    }
}
