#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pb_domain::config::{AccessConfig, ListingConfig, RateLimitConfig, SessionsConfig, TelegramConfig};
use pb_domain::error::{Error, Result};
use pb_domain::{AdminId, ChatId, PhoneNumber};
use pb_gateway::dispatch::Dispatcher;
use pb_gateway::notifier::TransportNotifier;
use pb_gateway::transport::{AdminTransport, ChatKind, Inbound, OutgoingMessage, Sender};
use pb_sessions::{
    AccessRegistry, Connection, ConnectionEvent, ConnectionHandle, ConnectRequest,
    CredentialStore, JsonStore, MessagingNetwork, RateLimiter, SessionManager,
};

pub const ADMIN: AdminId = AdminId(1);

// ── Recording transport ──────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingTransport {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub answered: Mutex<Vec<(String, String)>>,
}

impl RecordingTransport {
    pub fn texts_to(&self, chat: ChatId) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.chat == chat)
            .map(|m| m.text.clone())
            .collect()
    }

    pub fn last_text(&self, chat: ChatId) -> String {
        self.texts_to(chat).pop().expect("no message sent")
    }

    pub fn clear(&self) {
        self.sent.lock().clear();
    }
}

#[async_trait]
impl AdminTransport for RecordingTransport {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        self.sent.lock().push(message);
        Ok(())
    }

    async fn answer_callback(&self, callback_id: &str, text: &str) -> Result<()> {
        self.answered.lock().push((callback_id.into(), text.into()));
        Ok(())
    }

    async fn username_of(&self, id: AdminId) -> Result<Option<String>> {
        match id.0 {
            1001 => Ok(Some("reseller_one".into())),
            9999 => Err(Error::Transport("chat not found".into())),
            _ => Ok(None),
        }
    }
}

// ── Fake network ─────────────────────────────────────────────────────

pub struct FakeHandle;

#[async_trait]
impl ConnectionHandle for FakeHandle {
    async fn request_pairing_code(&self) -> Result<String> {
        Ok("ABCDEFGH".into())
    }

    async fn send_message(&self, _text: &str) -> Result<()> {
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    pub events: Mutex<Vec<(PhoneNumber, mpsc::Sender<ConnectionEvent>)>>,
}

impl FakeNetwork {
    pub async fn emit(&self, phone: &PhoneNumber, event: ConnectionEvent) {
        let tx = self
            .events
            .lock()
            .iter()
            .rev()
            .find(|(p, _)| p == phone)
            .map(|(_, tx)| tx.clone())
            .expect("no connection for phone");
        let _ = tx.send(event).await;
    }
}

#[async_trait]
impl MessagingNetwork for FakeNetwork {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection> {
        let (tx, rx) = mpsc::channel(16);
        self.events.lock().push((request.phone, tx));
        Ok(Connection {
            handle: Arc::new(FakeHandle),
            events: rx,
        })
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub transport: Arc<RecordingTransport>,
    pub network: Arc<FakeNetwork>,
    pub access: Arc<AccessRegistry>,
    pub sessions: Arc<SessionManager>,
    pub dispatcher: Dispatcher,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let transport = Arc::new(RecordingTransport::default());
        let network = Arc::new(FakeNetwork::default());

        let store = JsonStore::open(&dir.path().join("database")).unwrap();
        let access = Arc::new(
            AccessRegistry::open(
                store,
                &AccessConfig {
                    administrators: vec![ADMIN],
                },
            )
            .unwrap(),
        );
        let sessions = SessionManager::new(
            network.clone(),
            Arc::new(TransportNotifier::new(transport.clone())),
            access.clone(),
            CredentialStore::new(dir.path().join("sessions")),
            SessionsConfig {
                reconnect_delay_secs: 5,
                pairing_delay_ms: 1000,
                welcome_message: "hi".into(),
            },
        );
        let dispatcher = Dispatcher::new(
            access.clone(),
            Arc::new(RateLimiter::new(&RateLimitConfig::default())),
            sessions.clone(),
            transport.clone(),
            "PairBridgeBot",
            TelegramConfig::default(),
            ListingConfig::default(),
        );

        Self {
            dir,
            transport,
            network,
            access,
            sessions,
            dispatcher,
        }
    }

    /// Send `text` from `user` in their private chat.
    pub async fn say(&self, user: i64, text: &str) {
        self.dispatcher
            .handle(Inbound::Message {
                chat: ChatId(user),
                kind: ChatKind::Private,
                from: Sender {
                    id: AdminId(user),
                    username: None,
                },
                text: text.into(),
            })
            .await;
    }

    pub fn last_reply(&self, user: i64) -> String {
        self.transport.last_text(ChatId(user))
    }
}

pub fn phone(raw: &str) -> PhoneNumber {
    PhoneNumber::parse(raw).unwrap()
}

pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
