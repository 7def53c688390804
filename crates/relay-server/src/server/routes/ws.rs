//! WebSocket relay endpoint.
//!
//! `GET /ws` upgrades to a WebSocket carrying newline-free JSON events, one
//! per text frame. The credential (if any) comes from the `token` query
//! parameter or an `Authorization: Bearer` header and is verified before
//! the upgrade completes; a rejected handshake gets a plain 401 and never
//! touches the engine.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use relay_core::{AuthError, ClientEvent, Identity, IdentityVerifier};

use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let identity = match authorize(&state, &query, &headers).await {
        Ok(identity) => identity,
        Err(e) => {
            info!(error = %e, "WebSocket handshake rejected");
            return (StatusCode::UNAUTHORIZED, e.to_string()).into_response();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Resolve and verify the handshake credential.
///
/// Runs before the upgrade completes; an error refuses the connection
/// with no engine state created.
async fn authorize(
    state: &AppState,
    query: &WsQuery,
    headers: &HeaderMap,
) -> Result<Option<Identity>, AuthError> {
    let credential = credential_from(query, headers);
    state.verifier.verify(credential.as_deref()).await
}

/// Credential from the `token` query parameter, falling back to an
/// `Authorization: Bearer <token>` header.
fn credential_from(query: &WsQuery, headers: &HeaderMap) -> Option<String> {
    query.token.clone().or_else(|| bearer_token(headers))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|v| v.to_string())
}

/// Drive one WebSocket connection against the engine.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, identity: Option<Identity>) {
    let (mut sink, mut stream) = socket.split();
    let (id, mut outbound) = state.engine.connect(identity);

    // Pump engine deliveries to the socket. Ends when the registry entry is
    // dropped (its sender closes the channel) or the socket dies.
    let pump_id = id.clone();
    let pump = tokio::spawn(async move {
        while let Some(event) = outbound.recv().await {
            let frame = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!(id = %pump_id, error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(frame)).await {
                debug!(id = %pump_id, error = %e, "Outbound socket write failed");
                break;
            }
        }
        let _ = sink.close().await;
    });

    let reason = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => state.engine.handle_event(&id, event).await,
                Err(e) => {
                    // Unknown or malformed events are dropped, not fatal.
                    debug!(id = %id, error = %e, "Ignoring unparseable frame");
                }
            },
            Some(Ok(Message::Binary(_))) => {
                warn!(id = %id, "Binary frame ignored");
            }
            // Ping/pong frames are answered at the protocol layer.
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
            Some(Ok(Message::Close(_))) => break "client disconnect",
            Some(Err(e)) => {
                debug!(id = %id, error = %e, "WebSocket read error");
                break "transport error";
            }
            None => break "transport closed",
        }
    };

    state.engine.disconnect(&id, reason).await;
    // Disconnect dropped the registry's sender, so the pump drains and
    // exits on its own; await it to flush the close frame.
    let _ = pump.await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use axum::http::HeaderValue;
    use std::time::Duration;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState::new(ServerConfig::test_default()))
    }

    fn query(token: Option<&str>) -> WsQuery {
        WsQuery {
            token: token.map(|t| t.to_string()),
        }
    }

    #[test]
    fn test_credential_prefers_query_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );

        assert_eq!(
            credential_from(&query(Some("from-query")), &headers),
            Some("from-query".to_string())
        );
        assert_eq!(
            credential_from(&query(None), &headers),
            Some("from-header".to_string())
        );
        assert_eq!(credential_from(&query(None), &HeaderMap::new()), None);
    }

    #[test]
    fn test_bearer_token_requires_bearer_scheme() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Basic dXNlcjpwYXNz"),
        );
        assert_eq!(bearer_token(&headers), None);
    }

    #[tokio::test]
    async fn test_authorize_rejects_bad_token_without_engine_state() {
        let state = test_state();

        let result = authorize(&state, &query(Some("garbage")), &HeaderMap::new()).await;

        assert!(result.is_err());
        // A refused handshake never reaches the engine.
        assert_eq!(state.engine.connection_count(), 0);
    }

    #[tokio::test]
    async fn test_authorize_accepts_minted_token() {
        let state = test_state();
        let token = state
            .verifier
            .issue_token("alice", Duration::from_secs(60))
            .unwrap();

        let identity = authorize(&state, &query(Some(&token)), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(identity, Some(Identity::new("alice")));
    }

    #[tokio::test]
    async fn test_authorize_admits_anonymous_by_default() {
        let state = test_state();
        let identity = authorize(&state, &query(None), &HeaderMap::new())
            .await
            .unwrap();
        assert_eq!(identity, None);
    }
}
