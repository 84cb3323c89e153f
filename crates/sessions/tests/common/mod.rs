#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use pb_domain::config::{AccessConfig, SessionsConfig};
use pb_domain::error::{Error, Result};
use pb_domain::{AdminId, ChatId, PhoneNumber};
use pb_sessions::{
    AccessRegistry, Connection, ConnectionEvent, ConnectionHandle, ConnectRequest,
    CredentialStore, JsonStore, MessagingNetwork, SessionManager, SessionNotice, SessionNotifier,
};

pub const WELCOME: &str = "hello from the bridge";

// ── Fake network ─────────────────────────────────────────────────────

#[derive(Default)]
pub struct FakeHandle {
    pub pairing_requests: AtomicUsize,
    pub logouts: AtomicUsize,
    pub sent: Mutex<Vec<String>>,
    pub fail_pairing: AtomicBool,
    pub fail_logout: AtomicBool,
}

#[async_trait]
impl ConnectionHandle for FakeHandle {
    async fn request_pairing_code(&self) -> Result<String> {
        self.pairing_requests.fetch_add(1, Ordering::SeqCst);
        if self.fail_pairing.load(Ordering::SeqCst) {
            return Err(Error::network("fake", "pairing refused"));
        }
        Ok("ABCDEFGH".into())
    }

    async fn send_message(&self, text: &str) -> Result<()> {
        self.sent.lock().push(text.to_owned());
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        self.logouts.fetch_add(1, Ordering::SeqCst);
        if self.fail_logout.load(Ordering::SeqCst) {
            return Err(Error::network("fake", "logout timed out"));
        }
        Ok(())
    }
}

pub struct FakeConnection {
    pub phone: PhoneNumber,
    pub events: mpsc::Sender<ConnectionEvent>,
    pub handle: Arc<FakeHandle>,
}

impl FakeConnection {
    pub async fn emit(&self, event: ConnectionEvent) {
        // The receiver may already be gone for superseded connections.
        let _ = self.events.send(event).await;
    }
}

#[derive(Default)]
pub struct FakeNetwork {
    pub connections: Mutex<Vec<Arc<FakeConnection>>>,
    pub fail_connect: AtomicBool,
}

impl FakeNetwork {
    pub fn connect_count(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn last(&self) -> Arc<FakeConnection> {
        self.connections.lock().last().cloned().expect("no connection yet")
    }

    pub fn for_phone(&self, phone: &PhoneNumber) -> Vec<Arc<FakeConnection>> {
        self.connections
            .lock()
            .iter()
            .filter(|c| &c.phone == phone)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessagingNetwork for FakeNetwork {
    async fn connect(&self, request: ConnectRequest) -> Result<Connection> {
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::network(&request.phone, "connection refused"));
        }
        assert!(request.credentials_dir.is_dir());
        let (tx, rx) = mpsc::channel(16);
        let handle = Arc::new(FakeHandle::default());
        self.connections.lock().push(Arc::new(FakeConnection {
            phone: request.phone,
            events: tx,
            handle: Arc::clone(&handle),
        }));
        Ok(Connection { handle, events: rx })
    }
}

// ── Recording notifier ───────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<(ChatId, SessionNotice)>>,
}

impl RecordingNotifier {
    pub fn all(&self) -> Vec<(ChatId, SessionNotice)> {
        self.notices.lock().clone()
    }

    pub fn pairing_codes(&self) -> Vec<(ChatId, String)> {
        self.notices
            .lock()
            .iter()
            .filter_map(|(chat, n)| match n {
                SessionNotice::PairingCode { code, .. } => Some((*chat, code.clone())),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl SessionNotifier for RecordingNotifier {
    async fn notify(&self, chat: ChatId, notice: SessionNotice) -> Result<()> {
        self.notices.lock().push((chat, notice));
        Ok(())
    }
}

// ── Harness ──────────────────────────────────────────────────────────

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub network: Arc<FakeNetwork>,
    pub notifier: Arc<RecordingNotifier>,
    pub access: Arc<AccessRegistry>,
    pub manager: Arc<SessionManager>,
}

impl Harness {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        Self::in_dir(dir)
    }

    pub fn in_dir(dir: tempfile::TempDir) -> Self {
        let network = Arc::new(FakeNetwork::default());
        let notifier = Arc::new(RecordingNotifier::default());
        let access = Arc::new(open_registry(dir.path()));
        let config = SessionsConfig {
            reconnect_delay_secs: 5,
            pairing_delay_ms: 1000,
            welcome_message: WELCOME.into(),
        };
        let manager = SessionManager::new(
            network.clone(),
            notifier.clone(),
            access.clone(),
            CredentialStore::new(dir.path().join("sessions")),
            config,
        );
        Self {
            dir,
            network,
            notifier,
            access,
            manager,
        }
    }

    pub fn credentials_dir(&self, phone: &PhoneNumber) -> std::path::PathBuf {
        self.manager.credentials().dir_for(phone)
    }

    pub fn write_credentials(&self, phone: &PhoneNumber) {
        let dir = self.manager.credentials().ensure_dir(phone).unwrap();
        std::fs::write(dir.join(pb_sessions::credentials::CREDENTIALS_FILE), "{}").unwrap();
    }
}

pub fn open_registry(dir: &Path) -> AccessRegistry {
    let store = JsonStore::open(&dir.join("database")).unwrap();
    let config = AccessConfig {
        administrators: vec![AdminId(1)],
    };
    AccessRegistry::open(store, &config).unwrap()
}

pub fn phone(raw: &str) -> PhoneNumber {
    PhoneNumber::parse(raw).unwrap()
}

/// Let spawned tasks run.  Under a paused clock this also advances time.
pub async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}
