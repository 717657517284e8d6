//! Kidbank Service - HTTP API and recurring-credit tickers
//!
//! This is the main entry point for the kidbank service.

use std::sync::Arc;

use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kidbank_service::{create_router, AllowanceJob, AppState, InterestJob, ServiceConfig, Ticker};
use kidbank_store::{SqliteStore, Store};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,kidbank=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Kidbank Service");

    // Load configuration from environment
    let config = ServiceConfig::from_env();
    config.validate()?;

    tracing::info!(
        listen_addr = %config.listen_addr(),
        database_url = %config.database_url,
        allowance_tick_seconds = config.allowance_tick_seconds,
        interest_tick_seconds = config.interest_tick_seconds,
        "Service configuration loaded"
    );

    tracing::info!(url = %config.database_url, "Opening SQLite store");
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::connect(&config.database_url, config.database_max_connections).await?,
    );

    // Background tickers
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let allowance = tokio::spawn(
        Ticker::new(AllowanceJob::new(Arc::clone(&store)), config.allowance_tick())
            .run(shutdown_rx.clone()),
    );
    let interest = tokio::spawn(
        Ticker::new(InterestJob::new(Arc::clone(&store)), config.interest_tick())
            .run(shutdown_rx),
    );

    let listen_addr = config.listen_addr();
    let state = AppState::new(store, config)?;
    let app = create_router(state);
    tracing::info!("Router configured with all API endpoints");

    // Start HTTP server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP server stopped, waiting for tickers");
    // Receivers may already be gone if a ticker exited early.
    let _ = shutdown_tx.send(true);
    let (allowance, interest) = futures::future::join(allowance, interest).await;
    for result in [allowance, interest] {
        if let Err(e) = result {
            tracing::error!(error = %e, "Ticker task failed");
        }
    }

    tracing::info!("Kidbank Service stopped");
    Ok(())
}

/// Resolve on Ctrl-C or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl-C"),
        () = terminate => tracing::info!("Received SIGTERM"),
    }
}
