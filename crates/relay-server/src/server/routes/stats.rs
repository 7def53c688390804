//! Read-only connection stats.

use axum::{extract::State, response::Json};
use std::sync::Arc;

use relay_core::RegistrySnapshot;

use crate::server::AppState;

/// GET /api/stats
///
/// Point-in-time view of live connections and their room memberships.
pub async fn stats_handler(State(state): State<Arc<AppState>>) -> Json<RegistrySnapshot> {
    Json(state.engine.snapshot().await)
}
