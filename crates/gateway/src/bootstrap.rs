//! AppState construction and background-task spawning extracted from `main.rs`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use tokio_util::sync::CancellationToken;

use pb_bridge::BridgeNetwork;
use pb_domain::config::{Config, ConfigSeverity};
use pb_sessions::{AccessRegistry, CredentialStore, JsonStore, RateLimiter, SessionManager};

use crate::dispatch::Dispatcher;
use crate::notifier::TransportNotifier;
use crate::state::AppState;
use crate::telegram::TelegramTransport;
use crate::transport::AdminTransport;

/// How often expired rate-limit windows are dropped.
const RATE_WINDOW_PRUNE_INTERVAL: Duration = Duration::from_secs(300);

/// Validate config, initialize every subsystem and return a fully-wired
/// [`AppState`].  Contacts Telegram once to learn the bot's username.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Bot token ────────────────────────────────────────────────────
    let token_env = &config.telegram.token_env;
    let token = std::env::var(token_env)
        .ok()
        .filter(|t| !t.trim().is_empty())
        .with_context(|| format!("bot token missing: set {token_env}"))?;

    // ── Access registry ──────────────────────────────────────────────
    let store = JsonStore::open(&config.storage.state_path)
        .with_context(|| format!("opening state dir {}", config.storage.state_path.display()))?;
    let access = Arc::new(
        AccessRegistry::open(store, &config.access).context("loading access registry")?,
    );
    tracing::info!(
        path = %config.storage.state_path.display(),
        administrators = config.access.administrators.len(),
        resellers = access.resellers().len(),
        entitled = access.entitled().len(),
        bindings = access.bindings().len(),
        "access registry ready"
    );

    let limiter = Arc::new(RateLimiter::new(&config.rate_limit));

    // ── Admin channel ────────────────────────────────────────────────
    let telegram = Arc::new(
        TelegramTransport::new(&config.telegram, &token).context("building Telegram client")?,
    );
    let bot_username = telegram.identify().await.context("fetching bot identity")?;
    if let Err(e) = telegram.register_commands().await {
        tracing::warn!(error = %e, "publishing command menu failed");
    }
    tracing::info!(bot = %bot_username, "telegram bot ready");
    let transport: Arc<dyn AdminTransport> = telegram.clone();

    // ── Sessions ─────────────────────────────────────────────────────
    let credentials = CredentialStore::new(config.storage.sessions_path.clone());
    let network = Arc::new(BridgeNetwork::from_env(&config.bridge));
    let notifier = Arc::new(TransportNotifier::new(transport.clone()));
    let sessions = SessionManager::new(
        network,
        notifier,
        access.clone(),
        credentials,
        config.sessions.clone(),
    );
    tracing::info!(
        bridge = %config.bridge.url,
        sessions_path = %config.storage.sessions_path.display(),
        reconnect_delay_secs = config.sessions.reconnect_delay_secs,
        "session manager ready"
    );

    let dispatcher = Arc::new(Dispatcher::new(
        access.clone(),
        limiter.clone(),
        sessions.clone(),
        transport,
        bot_username,
        config.telegram.clone(),
        config.listing.clone(),
    ));

    Ok(AppState {
        config,
        shutdown: CancellationToken::new(),
        access,
        limiter,
        sessions,
        telegram,
        dispatcher,
    })
}

/// Replay persisted ownership and spawn the long-running tasks (rate
/// window pruning, Telegram polling).  Everything stops on `state.shutdown`.
pub fn spawn_background_tasks(state: &AppState) -> tokio::task::JoinHandle<()> {
    // ── Resume previously connected numbers ──────────────────────────
    let resumed = state.sessions.resume_all();
    tracing::info!(resumed, "resuming bound numbers");

    // ── Periodic rate-window pruning ─────────────────────────────────
    {
        let limiter = state.limiter.clone();
        let shutdown = state.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_WINDOW_PRUNE_INTERVAL);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }
                let removed = limiter.prune_at(Instant::now());
                if removed > 0 {
                    tracing::debug!(removed, tracked = limiter.tracked(), "pruned rate windows");
                }
            }
        });
    }

    // ── Telegram long polling ────────────────────────────────────────
    let polling = tokio::spawn(crate::telegram::run_polling(
        state.telegram.clone(),
        state.dispatcher.clone(),
        state.shutdown.clone(),
    ));
    tracing::info!("background tasks spawned");
    polling
}
