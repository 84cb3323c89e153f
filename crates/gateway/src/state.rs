use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use pb_domain::config::Config;
use pb_sessions::{AccessRegistry, RateLimiter, SessionManager};

use crate::dispatch::Dispatcher;
use crate::telegram::TelegramTransport;

/// Shared application state for `serve`.
///
/// Fields are grouped by concern:
/// - **Core**: config, shutdown token
/// - **Access**: registry, rate limiter
/// - **Sessions**: the session manager
/// - **Admin channel**: Telegram transport, dispatcher
#[derive(Clone)]
pub struct AppState {
    // ── Core ──────────────────────────────────────────────────────────
    pub config: Arc<Config>,
    pub shutdown: CancellationToken,

    // ── Access ────────────────────────────────────────────────────────
    pub access: Arc<AccessRegistry>,
    pub limiter: Arc<RateLimiter>,

    // ── Sessions ──────────────────────────────────────────────────────
    pub sessions: Arc<SessionManager>,

    // ── Admin channel ─────────────────────────────────────────────────
    pub telegram: Arc<TelegramTransport>,
    pub dispatcher: Arc<Dispatcher>,
}
