use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use pb_domain::config::{Config, LogFormat, ObservabilityConfig};
use pb_gateway::bootstrap;
use pb_gateway::cli::{Cli, Command, ConfigCommand};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let (config, config_path) = pb_gateway::cli::load_config()?;
            init_tracing(&config.observability);
            tracing::info!(config = %config_path, "configuration loaded");
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, config_path) = pb_gateway::cli::load_config()?;
            let valid = pb_gateway::cli::config::validate(&config, &config_path);
            if !valid {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _config_path) = pb_gateway::cli::load_config()?;
            pb_gateway::cli::config::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("pairbridge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Initialize tracing for `serve`: JSON lines by default, compact
/// human-readable output when `observability.format = "pretty"`.
fn init_tracing(obs: &ObservabilityConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,pb_gateway=debug,pb_sessions=debug"));

    let registry = tracing_subscriber::registry().with(env_filter);
    match obs.format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .init(),
    }
}

/// Run the bot until SIGINT or SIGTERM.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("PairBridge starting");

    // ── Build shared state & spawn background loops ──────────────────
    let state = bootstrap::build_app_state(config).await?;
    let polling = bootstrap::spawn_background_tasks(&state);

    shutdown_signal(state.shutdown.clone()).await;

    // ── Shutdown ────────────────────────────────────────────────────
    state.shutdown.cancel();
    state.sessions.shutdown();
    if let Err(e) = polling.await {
        tracing::warn!(error = %e, "polling task ended abnormally");
    }

    tracing::info!("shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.  Returns early if `shutdown` is already
/// cancelled.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
                    _ = shutdown.cancelled() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "SIGTERM handler unavailable");
                tokio::select! {
                    _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
                    _ = shutdown.cancelled() => {}
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::select! {
            _ = ctrl_c => tracing::info!("received SIGINT, shutting down"),
            _ = shutdown.cancelled() => {}
        }
    }
}
