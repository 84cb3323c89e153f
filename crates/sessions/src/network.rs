//! The messaging-network capability as seen by the session manager.
//!
//! A [`MessagingNetwork`] opens one connection per phone number.  Each
//! connection hands back a [`ConnectionHandle`] for requests and a channel
//! of [`ConnectionEvent`]s.  The production implementation lives in
//! `pb-bridge`; tests supply scripted fakes.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use pb_domain::error::Result;
use pb_domain::PhoneNumber;

/// Status code the network uses for an explicit logout.
pub const STATUS_LOGGED_OUT: u16 = 401;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The account was unlinked.  Never retried.
    LoggedOut,
    Transient {
        status_code: Option<u16>,
        message: Option<String>,
    },
}

impl DisconnectReason {
    pub fn from_status(status_code: Option<u16>, message: Option<String>) -> Self {
        if status_code == Some(STATUS_LOGGED_OUT) {
            DisconnectReason::LoggedOut
        } else {
            DisconnectReason::Transient {
                status_code,
                message,
            }
        }
    }

    pub fn is_logged_out(&self) -> bool {
        matches!(self, DisconnectReason::LoggedOut)
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::LoggedOut => f.write_str("logged out"),
            DisconnectReason::Transient {
                status_code,
                message,
            } => {
                f.write_str("transient")?;
                if let Some(code) = status_code {
                    write!(f, " ({code})")?;
                }
                if let Some(msg) = message {
                    write!(f, ": {msg}")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connecting,
    Open,
    Closed(DisconnectReason),
}

#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub phone: PhoneNumber,
    pub credentials_dir: PathBuf,
}

pub struct Connection {
    pub handle: Arc<dyn ConnectionHandle>,
    pub events: mpsc::Receiver<ConnectionEvent>,
}

#[async_trait]
pub trait MessagingNetwork: Send + Sync {
    /// Construct a connection.  Returns as soon as the connection object
    /// exists; progress arrives on `events`.
    async fn connect(&self, request: ConnectRequest) -> Result<Connection>;
}

#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Ask the network for a pairing code.  Returned raw, ungrouped.
    async fn request_pairing_code(&self) -> Result<String>;

    /// Send a text to the account's own chat on the network.
    async fn send_message(&self, text: &str) -> Result<()>;

    async fn logout(&self) -> Result<()>;
}
