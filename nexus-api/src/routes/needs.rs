//! Need endpoints: creation, ranking and notification

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use nexus_core::{Location, Match, Need, NeedStatus, Task, Urgency};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::LimitQuery;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Create need routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/needs/{need_id}/matches", get(get_matches))
        .route("/needs/{need_id}/notify-matches", post(notify_matches))
        .route("/needs/{need_id}/accept", post(accept_need))
        .route("/needs/{need_id}", get(get_need))
        .route("/needs", post(create_need))
}

#[derive(Debug, Deserialize)]
struct CreateNeedRequest {
    user_id: String,
    title: String,
    description: String,
    category: String,
    urgency: String,
    #[serde(default)]
    duration: u32,
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: Option<String>,
}

/// Public view of a Need: exact coordinates stay on the server
#[derive(Debug, Serialize)]
struct NeedView {
    id: String,
    user_id: String,
    title: String,
    description: String,
    category: String,
    urgency: Urgency,
    duration: u32,
    status: NeedStatus,
    cell: Option<String>,
    matchable: bool,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<Need> for NeedView {
    fn from(need: Need) -> Self {
        Self {
            matchable: need.embedding.is_some(),
            id: need.id,
            user_id: need.user_id,
            title: need.title,
            description: need.description,
            category: need.category,
            urgency: need.urgency,
            duration: need.duration,
            status: need.status,
            cell: need.location.cell,
            created_at: need.created_at,
            expires_at: need.expires_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreateNeedResponse {
    need: NeedView,
    matches: Vec<Match>,
    notified: usize,
}

#[derive(Debug, Serialize)]
struct NotifyResponse {
    matches: Vec<Match>,
    notified: usize,
}

#[derive(Debug, Deserialize)]
struct AcceptNeedRequest {
    volunteer_id: String,
    volunteer_name: String,
}

fn require(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::BadRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

/// Create a Need and push it to its best-matching volunteers
async fn create_need(
    State(state): State<AppState>,
    Json(req): Json<CreateNeedRequest>,
) -> ApiResult<(StatusCode, Json<CreateNeedResponse>)> {
    require("user_id", &req.user_id)?;
    require("title", &req.title)?;
    let urgency: Urgency = req.urgency.parse()?;

    let mut location = Location::new(req.latitude, req.longitude);
    if let Some(address) = req.address {
        location = location.with_address(address);
    }
    let mut need = Need::new(
        req.user_id,
        req.title,
        req.description,
        req.category,
        urgency,
        location,
    );
    need.duration = req.duration;

    let (need, summary) = state.service.create_need(need).await?;
    info!("Created need {} via API", need.id);

    Ok((
        StatusCode::CREATED,
        Json(CreateNeedResponse {
            need: need.into(),
            matches: summary.matches,
            notified: summary.delivered,
        }),
    ))
}

async fn get_need(
    State(state): State<AppState>,
    Path(need_id): Path<String>,
) -> ApiResult<Json<NeedView>> {
    let need = state
        .service
        .store()
        .get_need(&need_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound(format!("Not found: need {}", need_id)))?;
    Ok(Json(need.into()))
}

/// Rank volunteers for a Need
async fn get_matches(
    State(state): State<AppState>,
    Path(need_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Match>>> {
    let matches = state
        .service
        .matches_for_need(&need_id, query.effective())
        .await?;
    Ok(Json(matches))
}

/// Re-rank a Need and notify the matched volunteers
async fn notify_matches(
    State(state): State<AppState>,
    Path(need_id): Path<String>,
) -> ApiResult<Json<NotifyResponse>> {
    let summary = state.service.notify_matches_for_need(&need_id).await?;
    Ok(Json(NotifyResponse {
        matches: summary.matches,
        notified: summary.delivered,
    }))
}

async fn accept_need(
    State(state): State<AppState>,
    Path(need_id): Path<String>,
    Json(req): Json<AcceptNeedRequest>,
) -> ApiResult<Json<Task>> {
    require("volunteer_name", &req.volunteer_name)?;
    let task = state
        .service
        .accept_need(&need_id, &req.volunteer_id, &req.volunteer_name)
        .await?;
    Ok(Json(task))
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{get, json_body, post_json, send, state};
    use axum::http::StatusCode;
    use serde_json::json;

    fn need_body() -> serde_json::Value {
        json!({
            "user_id": "owner",
            "title": "Walk my dog",
            "description": "Friendly dog, one hour",
            "category": "pets",
            "urgency": "high",
            "latitude": 52.52,
            "longitude": 13.405
        })
    }

    fn volunteer_body(user: &str, skill: &str) -> serde_json::Value {
        json!({
            "user_id": user,
            "skills": [skill],
            "interests": [],
            "description": "Neighbor",
            "latitude": 52.53,
            "longitude": 13.405
        })
    }

    #[tokio::test]
    async fn test_create_need_hides_coordinates() {
        let state = state();
        let response = send(&state, post_json("/api/needs", need_body())).await;
        assert_eq!(response.status(), StatusCode::CREATED);

        let body = json_body(response).await;
        assert_eq!(body["need"]["status"], "requested");
        assert_eq!(body["need"]["matchable"], true);
        assert!(body["need"]["cell"].is_string());
        assert!(body["need"].get("latitude").is_none());
        assert!(body["need"].get("location").is_none());

        let id = body["need"]["id"].as_str().unwrap();
        let response = send(&state, get(&format!("/api/needs/{}", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_need_rejects_bad_input() {
        let state = state();
        let mut body = need_body();
        body["urgency"] = json!("whenever");
        let response = send(&state, post_json("/api/needs", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let mut body = need_body();
        body["latitude"] = json!(123.0);
        let response = send(&state, post_json("/api/needs", body)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_matches_and_notify() {
        let state = state();
        send(&state, post_json("/api/volunteers", volunteer_body("walker", "dog walking"))).await;
        send(&state, post_json("/api/volunteers", volunteer_body("gardener", "gardening"))).await;

        let created = json_body(send(&state, post_json("/api/needs", need_body())).await).await;
        assert_eq!(created["matches"].as_array().unwrap().len(), 1);
        let id = created["need"]["id"].as_str().unwrap().to_string();

        let response = send(&state, get(&format!("/api/needs/{}/matches?limit=-1", id))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let matches = json_body(response).await;
        assert_eq!(matches.as_array().unwrap().len(), 1);
        assert!(matches[0]["score"].as_f64().unwrap() > 0.3);

        let mut walker = state.hub.register("walker").unwrap();
        let response = send(
            &state,
            post_json(&format!("/api/needs/{}/notify-matches", id), json!({})),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["notified"], 1);
        assert!(walker.queue.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_unknown_need_is_404() {
        let state = state();
        let response = send(&state, get("/api/needs/missing/matches")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let response = send(&state, get("/api/needs/missing")).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_accept_twice_conflicts() {
        let state = state();
        let volunteer =
            json_body(send(&state, post_json("/api/volunteers", volunteer_body("walker", "dog"))).await)
                .await;
        let created = json_body(send(&state, post_json("/api/needs", need_body())).await).await;
        let uri = format!("/api/needs/{}/accept", created["need"]["id"].as_str().unwrap());
        let body = json!({ "volunteer_id": volunteer["id"], "volunteer_name": "Sam" });

        let response = send(&state, post_json(&uri, body.clone())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "accepted");

        let response = send(&state, post_json(&uri, body)).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
