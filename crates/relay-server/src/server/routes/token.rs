//! Dev-only token minting.
//!
//! Production deployments issue tokens from their own identity provider;
//! this endpoint exists so local clients can get a credential without one.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use crate::auth::parse_ttl;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    sub: Option<String>,
    #[serde(rename = "expiresIn")]
    expires_in: Option<String>,
}

/// POST /api/token
///
/// Mints an HS256 token for the given subject. Disabled in production.
pub async fn token_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TokenRequest>,
) -> impl IntoResponse {
    if state.config.production {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"error": "token endpoint disabled in production"})),
        );
    }

    let Some(sub) = request.sub.filter(|s| !s.is_empty()) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "sub is required"})),
        );
    };

    let expires_in = request.expires_in.unwrap_or_else(|| "1h".to_string());
    let Some(ttl) = parse_ttl(&expires_in) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("invalid expiresIn: {expires_in:?}")})),
        );
    };

    match state.verifier.issue_token(&sub, ttl) {
        Ok(token) => (
            StatusCode::OK,
            Json(json!({"token": token, "expiresIn": expires_in})),
        ),
        Err(e) => {
            warn!(error = %e, "Token minting failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "failed to mint token"})),
            )
        }
    }
}
