//! Inkboard Server
//!
//! Reference host for the board storage boundary. Serves boards, objects,
//! collaborators and templates over HTTP/JSON and relays object-change
//! notifications to WebSocket subscribers, one room per board.

mod config;
mod error;
mod routes;
mod state;
mod ws;

use crate::config::ServerConfig;
use crate::state::AppState;
use inkboard_core::MemoryStore;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("inkboard_server=info,tower_http=info")),
        )
        .init();

    let config = ServerConfig::from_env();
    info!(?config, "Loaded configuration");

    let state = Arc::new(AppState::new(
        Arc::new(MemoryStore::new()),
        config.channel_capacity,
    ));

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Inkboard server listening on {}", config.bind_addr);
    info!("WebSocket endpoint: ws://{}/ws", config.bind_addr);

    axum::serve(listener, app).await
}
