//! Health check endpoints

use axum::{extract::State, http::StatusCode, response::Json, routing::get, Router};
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    connections: usize,
    connected_users: usize,
    embedding_available: bool,
}

/// Health check handler
async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, code) = if state.hub.is_shut_down() {
        ("shutting_down", StatusCode::SERVICE_UNAVAILABLE)
    } else if !state.embedding_available {
        // ranking still works for already-embedded entities
        ("degraded", StatusCode::OK)
    } else {
        ("healthy", StatusCode::OK)
    };

    let response = HealthResponse {
        status,
        connections: state.hub.connection_count(),
        connected_users: state.hub.connected_user_ids().len(),
        embedding_available: state.embedding_available,
    };

    (code, Json(response))
}

/// Simple liveness check (always returns OK if server is running)
async fn liveness() -> &'static str {
    "OK"
}

/// Create health routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/live", get(liveness))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{get, json_body, send, state};
    use axum::http::StatusCode;

    #[tokio::test]
    async fn test_health_reports_connections() {
        let state = state();
        let _a = state.hub.register("alice").unwrap();
        let _b = state.hub.register("alice").unwrap();

        let response = send(&state, get("/api/health")).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["connections"], 2);
        assert_eq!(body["connected_users"], 1);
    }

    #[tokio::test]
    async fn test_health_after_shutdown() {
        let state = state();
        state.hub.shutdown();
        let response = send(&state, get("/api/health")).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_liveness() {
        let response = send(&state(), get("/api/health/live")).await;
        assert_eq!(response.status(), StatusCode::OK);
    }
}
