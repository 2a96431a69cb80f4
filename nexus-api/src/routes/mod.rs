//! API route definitions

mod health;
mod needs;
mod volunteers;
pub mod ws;

use axum::Router;
use serde::Deserialize;

use crate::AppState;

/// Create all API routes
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .merge(needs::routes())
        .merge(volunteers::routes())
        .merge(health::routes())
}

/// Create WebSocket routes (separate from API)
pub fn ws_routes() -> Router<AppState> {
    ws::routes()
}

/// Full application router
pub fn app(state: AppState) -> Router {
    Router::new()
        .nest("/api", api_routes())
        .merge(ws_routes())
        .with_state(state)
}

/// `?limit=N` on match listings
#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}

impl LimitQuery {
    /// Missing, zero or negative limits fall back to the ranker default (0)
    pub fn effective(&self) -> usize {
        self.limit
            .filter(|l| *l > 0)
            .map(|l| l as usize)
            .unwrap_or(0)
    }
}
