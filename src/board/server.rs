use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{Router, routing::get};
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState};
use super::db::{BoardDb, DbHandle};
use super::service::BoardLimits;
use super::ws;
use crate::errors::BoardError;

/// Capacity of the board event channel; slower subscribers skip ahead.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Configuration for the board server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub dev_mode: bool,
    pub limits: BoardLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            db_path: PathBuf::from(".taskboard/board.db"),
            dev_mode: false,
            limits: BoardLimits::default(),
        }
    }
}

/// Build the full application router: JSON API, event socket, request tracing.
pub fn build_router(state: Arc<AppState>) -> Router {
    api::api_router()
        .route("/ws", get(ws::ws_handler))
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn not_found() -> BoardError {
    BoardError::NotFound("No such route".to_string())
}

/// Open (and migrate) the database at `config.db_path`, creating its parent
/// directory if needed.
pub fn open_database(config: &ServerConfig) -> Result<BoardDb> {
    if let Some(parent) = config.db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).context("Failed to create database directory")?;
    }
    BoardDb::new(&config.db_path).context("Failed to initialize board database")
}

/// Start the board server and run until Ctrl+C.
pub async fn start_server(config: ServerConfig) -> Result<()> {
    let db = open_database(&config)?;
    let (events, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

    let state = Arc::new(AppState {
        db: DbHandle::new(db),
        events,
        limits: config.limits,
    });

    let mut app = build_router(state);
    if config.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(
        addr = %local_addr,
        db = %config.db_path.display(),
        dev = config.dev_mode,
        "taskboard listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
