//! The admin channel as seen by the dispatcher.
//!
//! Inbound updates are normalized into [`Inbound`]; outbound traffic goes
//! through [`AdminTransport`].  The Telegram adapter lives in
//! [`crate::telegram`]; tests use a recording fake.

use async_trait::async_trait;

use pb_domain::error::Result;
use pb_domain::{AdminId, ChatId};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Inbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    /// Groups, supergroups and channels.
    Shared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub id: AdminId,
    pub username: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Message {
        chat: ChatId,
        kind: ChatKind,
        from: Sender,
        text: String,
    },
    Callback {
        id: String,
        chat: ChatId,
        kind: ChatKind,
        from: Sender,
        data: String,
    },
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outbound
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ButtonAction {
    Callback(String),
    Url(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub action: ButtonAction,
}

impl Button {
    pub fn callback(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Callback(data.into()),
        }
    }

    pub fn url(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            action: ButtonAction::Url(url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat: ChatId,
    pub text: String,
    pub markdown: bool,
    /// Rows of inline buttons.
    pub buttons: Vec<Vec<Button>>,
}

impl OutgoingMessage {
    pub fn text(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            chat,
            text: text.into(),
            markdown: false,
            buttons: Vec::new(),
        }
    }

    pub fn markdown(chat: ChatId, text: impl Into<String>) -> Self {
        Self {
            markdown: true,
            ..Self::text(chat, text)
        }
    }

    pub fn with_buttons(mut self, rows: Vec<Vec<Button>>) -> Self {
        self.buttons = rows;
        self
    }
}

#[async_trait]
pub trait AdminTransport: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<()>;

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()>;

    /// Public username of `id`, if it has one.
    async fn username_of(&self, id: AdminId) -> Result<Option<String>>;
}
