use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use items_backend::{
    auth::PasswordHasher,
    build_router,
    clock::SystemClock,
    config::{AppConfig, Cli},
    state::AppState,
    store::DocumentStore,
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = AppConfig::from_env()
        .context("failed to load application configuration")?
        .with_cli(cli);

    let store = match &config.data_file {
        Some(path) => {
            info!(path = %path.display(), "storage: snapshot file");
            DocumentStore::open(path)
                .await
                .with_context(|| format!("failed to open data file {}", path.display()))?
        }
        None => {
            info!("storage: in-memory");
            DocumentStore::in_memory()
        }
    };

    let state = AppState::new(
        Arc::new(store),
        Arc::new(SystemClock),
        PasswordHasher::new(config.bcrypt_cost),
    );
    let ledger = state.ledger.clone();

    // Stale periods must be closed before this run opens its own.
    ledger
        .reconcile_on_startup()
        .await
        .context("failed to reconcile runtime periods")?;

    if config.seed_demo_user {
        state
            .ensure_demo_user()
            .await
            .context("failed to seed demo user")?;
    }

    let app = build_router(state, config.cors_origin_header()?);

    let addr = config.address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    let period = ledger.open_interval().await;

    info!(address = %addr, "items backend started");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    ledger.close_interval(period.as_ref()).await;

    served.context("server error")?;
    info!("items backend stopped");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("items_backend=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
