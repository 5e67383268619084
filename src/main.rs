//! RTMS relay gateway binary.

use anyhow::Result;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rtms_relay::api::{build_router, AppState};
use rtms_relay::{Config, FanoutHub, SessionManager};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rtms_relay=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Optional config file path as the first argument
    let config_path = std::env::args().nth(1);
    let config = Arc::new(Config::load(config_path.as_deref())?);

    info!(
        host = %config.server.host,
        port = config.server.http_port,
        webhook_path = %config.server.webhook_path,
        recordings_dir = %config.recording.dir,
        "starting RTMS relay gateway"
    );

    let hub = Arc::new(FanoutHub::new());
    let sessions = Arc::new(SessionManager::new(config.clone(), hub.clone()));

    let state = AppState {
        config: config.clone(),
        sessions: sessions.clone(),
        hub,
    };
    let router = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.http_port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutting down, closing active sessions");
    sessions.shutdown_all().await;

    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c"),
        _ = terminate => info!("received SIGTERM"),
    }
}
