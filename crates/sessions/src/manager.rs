//! One messaging-network connection per phone number.
//!
//! The [`SessionManager`] owns the in-memory session table.  Every record
//! carries a generation number; connection events are tagged with the
//! generation of the connection that produced them, and events for a
//! generation that is no longer in the table are dropped.  That is what
//! lets a new `initiate` supersede a residual entry without the old
//! connection's late events tearing down the new one.
//!
//! State per phone:
//!
//! ```text
//!   initiate ──▶ Connecting ──(no creds, requester)──▶ AwaitingPairing
//!                    │                                      │
//!                    └──────────────▶ Open ◀────────────────┘
//!                                      │
//!                 close ◀──────────────┘   (any state may close)
//!                   ├─ logged out ─▶ unbind owner, delete credentials
//!                   └─ transient  ─▶ reconnect after fixed delay
//! ```

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use pb_domain::config::SessionsConfig;
use pb_domain::error::{Error, Result};
use pb_domain::trace::TraceEvent;
use pb_domain::{ChatId, PhoneNumber};

use crate::access::AccessRegistry;
use crate::credentials::CredentialStore;
use crate::network::{
    ConnectRequest, ConnectionEvent, ConnectionHandle, DisconnectReason, MessagingNetwork,
};
use crate::notify::{SessionNotice, SessionNotifier};
use crate::pairing::format_pairing_code;
use crate::reconnect::ReconnectScheduler;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Public types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    /// A pairing code was requested for the requester; waiting for the
    /// account holder to enter it.
    AwaitingPairing,
    Open,
}

impl SessionState {
    /// Not yet open.
    pub fn is_connecting(&self) -> bool {
        matches!(self, SessionState::Connecting | SessionState::AwaitingPairing)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitiateOutcome {
    /// A new connection was constructed.
    Started { generation: u64 },
    /// A connection for this number is already being established; no
    /// duplicate was created.
    InFlight(SessionState),
    AlreadyOpen,
    /// A newer `initiate` for the same number replaced this one while it
    /// was connecting.
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminateOutcome {
    pub phone: PhoneNumber,
    pub chat: ChatId,
    /// Whether the network acknowledged the logout.
    pub remote_logout: bool,
    pub credentials_removed: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Manager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct SessionRecord {
    generation: u64,
    state: SessionState,
    requester: Option<ChatId>,
    /// `None` until `connect` returns.
    handle: Option<Arc<dyn ConnectionHandle>>,
    pairing_requested: bool,
    stop: CancellationToken,
}

pub struct SessionManager {
    network: Arc<dyn MessagingNetwork>,
    notifier: Arc<dyn SessionNotifier>,
    access: Arc<AccessRegistry>,
    credentials: CredentialStore,
    reconnects: Arc<ReconnectScheduler>,
    config: SessionsConfig,
    table: Mutex<HashMap<PhoneNumber, SessionRecord>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl SessionManager {
    /// Build the manager and start its reconnect worker.  Must be called
    /// inside a tokio runtime.
    pub fn new(
        network: Arc<dyn MessagingNetwork>,
        notifier: Arc<dyn SessionNotifier>,
        access: Arc<AccessRegistry>,
        credentials: CredentialStore,
        config: SessionsConfig,
    ) -> Arc<Self> {
        let (reconnects, due) = ReconnectScheduler::new(config.reconnect_delay());
        let manager = Arc::new(Self {
            network,
            notifier,
            access,
            credentials,
            reconnects,
            config,
            table: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            shutdown: CancellationToken::new(),
        });
        tokio::spawn(reconnect_worker(Arc::downgrade(&manager), due));
        manager
    }

    pub fn access(&self) -> &Arc<AccessRegistry> {
        &self.access
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn reconnects(&self) -> &Arc<ReconnectScheduler> {
        &self.reconnects
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self, phone: &PhoneNumber) -> Option<SessionState> {
        self.table.lock().get(phone).map(|r| r.state.clone())
    }

    pub fn active_count(&self) -> usize {
        self.table.lock().len()
    }

    // ── Initiate ─────────────────────────────────────────────────────

    /// Start a connection for `phone`.  Returns once the connection object
    /// exists; pairing, open and close are handled as events arrive.
    ///
    /// A number that is already connecting is not connected twice.  If the
    /// in-flight attempt has no requester yet, `requester` is attached and
    /// receives the pairing code.
    pub async fn initiate(
        self: &Arc<Self>,
        phone: PhoneNumber,
        requester: Option<ChatId>,
    ) -> Result<InitiateOutcome> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Other("session manager is shutting down".into()));
        }

        let (generation, stop) = {
            let mut table = self.table.lock();
            if let Some(existing) = table.get_mut(&phone) {
                let current = existing.state.clone();
                if current == SessionState::Open {
                    return Ok(InitiateOutcome::AlreadyOpen);
                }
                if current.is_connecting() {
                    if existing.requester.is_none() && requester.is_some() {
                        existing.requester = requester;
                        tracing::info!(phone = %phone, "requester attached to in-flight session");
                        if let Some(job) = self.claim_pairing(&phone, existing) {
                            self.spawn_pairing(phone.clone(), job);
                        }
                    }
                    return Ok(InitiateOutcome::InFlight(current));
                }
            }

            let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
            let stop = self.shutdown.child_token();
            if let Some(old) = table.insert(
                phone.clone(),
                SessionRecord {
                    generation,
                    state: SessionState::Connecting,
                    requester,
                    handle: None,
                    pairing_requested: false,
                    stop: stop.clone(),
                },
            ) {
                old.stop.cancel();
            }
            (generation, stop)
        };

        self.reconnects.cancel(&phone);

        TraceEvent::SessionInitiated {
            phone: phone.to_string(),
            generation,
            has_requester: requester.is_some(),
        }
        .emit();

        let credentials_dir = match self.credentials.ensure_dir(&phone) {
            Ok(dir) => dir,
            Err(e) => {
                self.remove_if_current(&phone, generation);
                return Err(e);
            }
        };

        let connection = match self
            .network
            .connect(ConnectRequest {
                phone: phone.clone(),
                credentials_dir,
            })
            .await
        {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(phone = %phone, error = %e, "connect failed");
                self.remove_if_current(&phone, generation);
                if let Some(chat) = requester {
                    self.send_notice(
                        chat,
                        SessionNotice::ConnectFailed {
                            phone: phone.clone(),
                            reason: e.to_string(),
                        },
                    )
                    .await;
                }
                return Err(match e {
                    e @ Error::Network { .. } => e,
                    other => Error::network(&phone, other),
                });
            }
        };

        let attached = {
            let mut table = self.table.lock();
            match table.get_mut(&phone) {
                Some(r) if r.generation == generation => {
                    r.handle = Some(Arc::clone(&connection.handle));
                    true
                }
                _ => false,
            }
        };
        if !attached {
            tracing::debug!(phone = %phone, generation, "superseded while connecting");
            return Ok(InitiateOutcome::Abandoned);
        }

        tokio::spawn(Arc::clone(self).drive(phone, generation, connection.events, stop));
        Ok(InitiateOutcome::Started { generation })
    }

    /// Reconnect every number in the ownership mapping without a requester.
    /// Fire-and-forget; failures are logged.  Returns how many were started.
    pub fn resume_all(self: &Arc<Self>) -> usize {
        let numbers = self.access.owned_numbers();
        for phone in &numbers {
            let this = Arc::clone(self);
            let phone = phone.clone();
            tokio::spawn(async move {
                if let Err(e) = this.initiate(phone.clone(), None).await {
                    tracing::warn!(phone = %phone, error = %e, "resume failed");
                }
            });
        }
        tracing::info!(count = numbers.len(), "resuming bound sessions");
        numbers.len()
    }

    // ── Terminate ────────────────────────────────────────────────────

    /// Log out and forget `phone`: network logout, ownership binding,
    /// credential directory and table entry.  Requires both a live entry and
    /// an owner; otherwise nothing is touched.
    ///
    /// The binding is cleared before the directory is deleted, and a failed
    /// delete only clears `credentials_removed`, so a number is never left
    /// bound once its session is gone.
    pub async fn terminate(&self, phone: &PhoneNumber) -> Result<TerminateOutcome> {
        let (record, chat) = {
            let mut table = self.table.lock();
            let chat = match (table.contains_key(phone), self.access.owner_of(phone)) {
                (true, Some(chat)) => chat,
                _ => return Err(Error::NoActiveSession(phone.to_string())),
            };
            let record = table
                .remove(phone)
                .ok_or_else(|| Error::NoActiveSession(phone.to_string()))?;
            (record, chat)
        };
        record.stop.cancel();
        self.reconnects.cancel(phone);

        let remote_logout = match &record.handle {
            Some(handle) => match handle.logout().await {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(phone = %phone, error = %e, "logout failed, removing locally");
                    false
                }
            },
            None => false,
        };

        let unbound = self.access.unbind_ownership(chat);
        let credentials_removed = match self.credentials.remove(phone) {
            Ok(removed) => removed,
            Err(e) => {
                tracing::error!(phone = %phone, error = %e, "failed to delete credentials");
                false
            }
        };
        unbound?;

        TraceEvent::SessionTerminated {
            phone: phone.to_string(),
            chat_id: chat.0,
            remote_logout,
        }
        .emit();

        Ok(TerminateOutcome {
            phone: phone.clone(),
            chat,
            remote_logout,
            credentials_removed,
        })
    }

    /// Stop all connections and pending reconnects.  Bindings and
    /// credentials stay on disk for the next start.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        self.reconnects.cancel_all();
        let drained: Vec<_> = self.table.lock().drain().collect();
        tracing::info!(sessions = drained.len(), "session manager stopped");
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // Event handling
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    async fn drive(
        self: Arc<Self>,
        phone: PhoneNumber,
        generation: u64,
        mut events: mpsc::Receiver<ConnectionEvent>,
        stop: CancellationToken,
    ) {
        loop {
            let event = tokio::select! {
                biased;
                _ = stop.cancelled() => return,
                ev = events.recv() => ev,
            };
            match event {
                Some(ConnectionEvent::Connecting) => self.on_connecting(&phone, generation),
                Some(ConnectionEvent::Open) => self.on_open(&phone, generation).await,
                Some(ConnectionEvent::Closed(reason)) => {
                    self.on_close(&phone, generation, reason);
                    return;
                }
                None => {
                    let reason = DisconnectReason::Transient {
                        status_code: None,
                        message: Some("event stream ended".into()),
                    };
                    self.on_close(&phone, generation, reason);
                    return;
                }
            }
        }
    }

    fn on_connecting(self: &Arc<Self>, phone: &PhoneNumber, generation: u64) {
        let pairing = {
            let mut table = self.table.lock();
            match table.get_mut(phone) {
                Some(r) if r.generation == generation => self.claim_pairing(phone, r),
                _ => return,
            }
        };
        if let Some(pairing) = pairing {
            self.spawn_pairing(phone.clone(), pairing);
        }
    }

    async fn on_open(&self, phone: &PhoneNumber, generation: u64) {
        let (requester, handle) = {
            let mut table = self.table.lock();
            match table.get_mut(phone) {
                Some(r) if r.generation == generation => {
                    r.state = SessionState::Open;
                    (r.requester, r.handle.clone())
                }
                _ => return,
            }
        };

        TraceEvent::SessionOpened {
            phone: phone.to_string(),
            generation,
            owner: requester.map(|c| c.0),
        }
        .emit();

        if let Some(chat) = requester {
            match self.access.bind_ownership(chat, phone.clone()) {
                Ok(_) => {
                    self.send_notice(chat, SessionNotice::Connected { phone: phone.clone() })
                        .await
                }
                Err(e) => tracing::error!(phone = %phone, chat_id = %chat, error = %e, "failed to persist ownership"),
            }
        }

        if let Some(handle) = handle {
            if !self.config.welcome_message.is_empty() {
                if let Err(e) = handle.send_message(&self.config.welcome_message).await {
                    tracing::warn!(phone = %phone, error = %e, "welcome message not delivered");
                }
            }
        }
    }

    fn on_close(&self, phone: &PhoneNumber, generation: u64, reason: DisconnectReason) {
        {
            let mut table = self.table.lock();
            match table.get(phone) {
                Some(r) if r.generation == generation => {
                    if let Some(r) = table.remove(phone) {
                        r.stop.cancel();
                    }
                }
                _ => {
                    tracing::debug!(phone = %phone, generation, "stale close ignored");
                    return;
                }
            }
        }

        TraceEvent::SessionClosed {
            phone: phone.to_string(),
            generation,
            logged_out: reason.is_logged_out(),
            reason: reason.to_string(),
        }
        .emit();

        if reason.is_logged_out() {
            self.reconnects.cancel(phone);
            match self.access.unbind_phone(phone) {
                Ok(Some(chat)) => tracing::info!(phone = %phone, chat_id = %chat, "owner unbound after logout"),
                Ok(None) => {}
                Err(e) => tracing::error!(phone = %phone, error = %e, "failed to unbind owner"),
            }
            if let Err(e) = self.credentials.remove(phone) {
                tracing::error!(phone = %phone, error = %e, "failed to delete credentials");
            }
        } else if !self.shutdown.is_cancelled() {
            self.reconnects.schedule(phone.clone());
        }
    }

    // ── Pairing ──────────────────────────────────────────────────────

    /// Mark the record as pairing if it has a requester, a handle, no prior
    /// request and no stored credentials.
    fn claim_pairing(&self, phone: &PhoneNumber, record: &mut SessionRecord) -> Option<PairingJob> {
        if record.pairing_requested || !record.state.is_connecting() {
            return None;
        }
        let chat = record.requester?;
        let handle = record.handle.clone()?;
        if self.credentials.has_credentials(phone) {
            return None;
        }
        record.pairing_requested = true;
        record.state = SessionState::AwaitingPairing;
        Some(PairingJob {
            generation: record.generation,
            chat,
            handle,
            stop: record.stop.clone(),
        })
    }

    fn spawn_pairing(self: &Arc<Self>, phone: PhoneNumber, job: PairingJob) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = job.stop.cancelled() => return,
                _ = tokio::time::sleep(this.config.pairing_delay()) => {}
            }

            // Credentials may have been written while we waited.
            if this.credentials.has_credentials(&phone) {
                tracing::debug!(phone = %phone, "credentials present, pairing skipped");
                this.release_pairing(&phone, job.generation);
                return;
            }

            let notice = match job.handle.request_pairing_code().await {
                Ok(raw) => {
                    if job.stop.is_cancelled() {
                        return;
                    }
                    TraceEvent::PairingCodeIssued {
                        phone: phone.to_string(),
                        chat_id: job.chat.0,
                    }
                    .emit();
                    SessionNotice::PairingCode {
                        phone: phone.clone(),
                        code: format_pairing_code(&raw),
                    }
                }
                Err(e) => {
                    tracing::warn!(phone = %phone, error = %e, "pairing code request failed");
                    this.release_pairing(&phone, job.generation);
                    SessionNotice::PairingFailed {
                        phone: phone.clone(),
                        reason: e.to_string(),
                    }
                }
            };
            this.send_notice(job.chat, notice).await;
        });
    }

    /// Let a later `reqpair` retry after a failed pairing request.
    fn release_pairing(&self, phone: &PhoneNumber, generation: u64) {
        let mut table = self.table.lock();
        if let Some(r) = table.get_mut(phone) {
            if r.generation == generation && r.state == SessionState::AwaitingPairing {
                r.pairing_requested = false;
                r.state = SessionState::Connecting;
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn remove_if_current(&self, phone: &PhoneNumber, generation: u64) {
        let mut table = self.table.lock();
        if table.get(phone).map(|r| r.generation) == Some(generation) {
            table.remove(phone);
        }
    }

    async fn send_notice(&self, chat: ChatId, notice: SessionNotice) {
        let phone = notice.phone().clone();
        if let Err(e) = self.notifier.notify(chat, notice).await {
            tracing::warn!(phone = %phone, chat_id = %chat, error = %e, "notice not delivered");
        }
    }
}

struct PairingJob {
    generation: u64,
    chat: ChatId,
    handle: Arc<dyn ConnectionHandle>,
    stop: CancellationToken,
}

async fn reconnect_worker(
    manager: Weak<SessionManager>,
    mut due: mpsc::UnboundedReceiver<PhoneNumber>,
) {
    while let Some(phone) = due.recv().await {
        let Some(manager) = manager.upgrade() else {
            break;
        };
        tokio::spawn(async move {
            match manager.initiate(phone.clone(), None).await {
                Ok(outcome) => tracing::debug!(phone = %phone, ?outcome, "reconnect attempted"),
                Err(e) => tracing::warn!(phone = %phone, error = %e, "reconnect failed"),
            }
        });
    }
}
