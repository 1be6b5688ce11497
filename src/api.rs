//! HTTP API endpoints.
//!
//! Gameplay runs over the WebSocket; these routes exist for health checks
//! and for clients that want a one-off snapshot without connecting.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::GameError;
use crate::protocol::PROTOCOL_VERSION;
use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub protocol: String,
    pub live_rooms: usize,
    pub llm_providers: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub session: Option<String>,
}

/// API routes, mounted under `/api`
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health))
        .route("/rooms/{code}", get(room_snapshot))
}

/// GET /api/health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        protocol: PROTOCOL_VERSION.to_string(),
        live_rooms: state.room_count().await,
        llm_providers: state
            .llm
            .providers
            .iter()
            .map(|p| p.name().to_string())
            .collect(),
    })
}

/// Snapshot of a room as seen by `session`.
///
/// GET /api/rooms/{code}?session=<id>
///
/// Without a session (or with one that holds no seat) the observer view is
/// returned.
pub async fn room_snapshot(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
    Query(query): Query<SnapshotQuery>,
) -> Response {
    match state.snapshot(&code, query.session.as_deref()).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(e @ GameError::RoomNotFound(_)) => {
            (StatusCode::NOT_FOUND, e.to_string()).into_response()
        }
        Err(e) => {
            tracing::error!("Snapshot failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{RoomSnapshot, ViewerRole};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    const SESSION: &str = "01J00000000000000000000000";

    fn app(state: Arc<AppState>) -> Router {
        Router::new().nest("/api", router()).with_state(state)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(app: Router, uri: &str) -> (StatusCode, Option<T>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).ok())
    }

    #[tokio::test]
    async fn test_health() {
        let state = Arc::new(AppState::offline());
        let (status, body) = get_json::<HealthResponse>(app(state), "/api/health").await;

        assert_eq!(status, StatusCode::OK);
        let body = body.unwrap();
        assert_eq!(body.status, "ok");
        assert_eq!(body.llm_providers, vec!["template".to_string()]);
    }

    #[tokio::test]
    async fn test_room_snapshot_per_viewer() {
        let state = Arc::new(AppState::offline());
        let created = state.create_room(&SESSION.to_string(), true).await.unwrap();

        let (status, player) = get_json::<RoomSnapshot>(
            app(state.clone()),
            &format!("/api/rooms/{}?session={}", created.code, SESSION),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let player = player.unwrap();
        assert_eq!(player.viewer.role, ViewerRole::Player);
        assert_eq!(player.keyword, "???");

        let (_, observer) = get_json::<RoomSnapshot>(
            app(state),
            &format!("/api/rooms/{}", created.code.to_lowercase()),
        )
        .await;
        assert_eq!(observer.unwrap().viewer.role, ViewerRole::Observer);
    }

    #[tokio::test]
    async fn test_unknown_room_is_404() {
        let state = Arc::new(AppState::offline());
        let (status, _) = get_json::<RoomSnapshot>(app(state), "/api/rooms/ZZZZZZ").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
