// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::sync::Arc;

use skinsync_rust_server::{
    api::router,
    clock::SystemClock,
    config::{AppConfig, ConfigError, LogFormat, DEFAULT_LOG_FILTER},
    state::AppState,
    storage::{seed::seed, seed::SeedError, Database, RefreshTokenSweep, StorageError},
    sweeper::Sweeper,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Error)]
enum StartupError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    #[error("seeding: {0}")]
    Seed(#[from] SeedError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
    shutdown.cancel();
}

async fn run() -> Result<(), StartupError> {
    let config = AppConfig::from_env()?;
    init_tracing(config.log_format);

    std::fs::create_dir_all(&config.data_dir)?;
    let db = Database::open(&config.database_path())?;
    seed(&db, config.bootstrap_admin.as_ref())?;

    let addr = config.bind_address();
    let revocation_interval = config.revocation_sweep_interval;
    let otp_interval = config.otp_sweep_interval;
    let refresh_interval = config.refresh_sweep_interval;
    let state = AppState::new(config, db, Arc::new(SystemClock));

    let shutdown = CancellationToken::new();
    tokio::spawn(Sweeper::new(state.revocations.clone(), revocation_interval).run(shutdown.clone()));
    tokio::spawn(Sweeper::new(state.otp.clone(), otp_interval).run(shutdown.clone()));
    let refresh_sweep = Arc::new(RefreshTokenSweep::new(state.db.clone(), state.clock.clone()));
    tokio::spawn(Sweeper::new(refresh_sweep, refresh_interval).run(shutdown.clone()));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "SkinSync auth server listening (docs at /docs)");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    info!("Server stopped");
    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        // Tracing may not be initialised yet
        eprintln!("skinsync-rust-server failed to start: {e}");
        std::process::exit(1);
    }
}
