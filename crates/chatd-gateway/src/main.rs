use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

mod app;
mod auth;
mod error;
mod protocol;
mod ws;

/// chatd WebSocket gateway — binds `/ws/chat` and drives one workflow
/// engine per connected session (spec.md §1/§4.4).
#[derive(Parser, Debug)]
#[command(name = "chatd-gateway")]
struct Cli {
    /// Path to `chatd.toml`; defaults to `CHATD_CONFIG` or `~/.chatd/chatd.toml`.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.or_else(|| std::env::var("CHATD_CONFIG").ok());
    let config = chatd_core::config::AppConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        chatd_core::config::AppConfig::default()
    });

    chatd_core::config::init_tracing(&config.logging);

    let pool = chatd_storage::ConnectionPool::open(&config.database.path, config.database.pool_size)?;
    let storage = Arc::new(chatd_storage::StorageGateway::new(pool));
    let session_manager = app::default_session_manager(storage.clone(), config.chat_record.clone());

    let bind = config.server.bind.clone();
    let port = config.server.port;
    let state = Arc::new(app::AppState::new(config, storage, session_manager));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("chatd gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Waits for Ctrl-C (or SIGTERM on unix) so in-flight connections drain
/// their `tokio::select!` loops and detach their sessions cleanly instead
/// of being dropped mid-turn.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl-C handler");
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
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown signal received");
}
