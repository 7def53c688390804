use anyhow::Result;
use axum::{
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde_json::json;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::ServeDir,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

use relay_core::RelayEngine;

use crate::auth::TokenVerifier;
use crate::config::ServerConfig;

mod routes;

/// How often to sweep for connections whose transport died silently.
const STALE_SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Server application state
pub struct AppState {
    /// Relay engine owning connections, rooms and routing
    pub engine: RelayEngine,
    /// Handshake credential verifier
    pub verifier: TokenVerifier,
    /// Configuration loaded at startup
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        let verifier = TokenVerifier::new(&config.jwt_secret, config.allow_anonymous);
        Self {
            engine: RelayEngine::new(),
            verifier,
            config,
        }
    }
}

/// Start the HTTP server, running until `shutdown` is cancelled.
pub async fn start(config: ServerConfig, shutdown: CancellationToken) -> Result<()> {
    let port = config.port;
    let state = Arc::new(AppState::new(config));

    // Periodic sweep for entries whose transport vanished without a close
    // frame. Each removal runs the full disconnect cascade.
    let sweep_state = state.clone();
    let sweep_shutdown = shutdown.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(STALE_SWEEP_INTERVAL);
        loop {
            tokio::select! {
                _ = sweep_shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let removed = sweep_state.engine.cleanup_stale().await;
                    if removed > 0 {
                        warn!(removed, "Swept stale connections");
                    }
                }
            }
        }
    });

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting relay server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Relay server stopped");
    Ok(())
}

/// Create the Axum router with all routes and middleware
fn create_router(state: Arc<AppState>) -> Router {
    let public_dir = state.config.public_dir.clone();

    Router::new()
        .route("/ws", get(routes::ws::ws_handler))
        .route("/health", get(health_handler))
        .route("/api/stats", get(routes::stats::stats_handler))
        .route("/api/token", post(routes::token::token_handler))
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
}

/// Simple health check endpoint (for load balancers)
async fn health_handler() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}
