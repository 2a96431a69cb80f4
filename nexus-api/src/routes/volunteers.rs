//! Volunteer endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use nexus_core::{Availability, Location, Match, Volunteer};
use serde::{Deserialize, Serialize};

use super::LimitQuery;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Create volunteer routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/volunteers/{volunteer_id}/matches", get(get_matches))
        .route("/volunteers", post(register_volunteer))
}

#[derive(Debug, Deserialize)]
struct RegisterVolunteerRequest {
    user_id: String,
    #[serde(default)]
    skills: Vec<String>,
    #[serde(default)]
    interests: Vec<String>,
    #[serde(default)]
    description: String,
    #[serde(default)]
    availability: Vec<Availability>,
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Serialize)]
struct VolunteerView {
    id: String,
    user_id: String,
    skills: Vec<String>,
    interests: Vec<String>,
    description: String,
    availability: Vec<Availability>,
    cell: Option<String>,
    matchable: bool,
}

impl From<Volunteer> for VolunteerView {
    fn from(v: Volunteer) -> Self {
        Self {
            matchable: v.embedding.is_some(),
            id: v.id,
            user_id: v.user_id,
            skills: v.skills,
            interests: v.interests,
            description: v.description,
            availability: v.availability,
            cell: v.location.cell,
        }
    }
}

async fn register_volunteer(
    State(state): State<AppState>,
    Json(req): Json<RegisterVolunteerRequest>,
) -> ApiResult<(StatusCode, Json<VolunteerView>)> {
    if req.user_id.trim().is_empty() {
        return Err(ApiError::BadRequest("user_id must not be empty".to_string()));
    }
    if let Some(slot) = req.availability.iter().find(|a| a.day_of_week > 6) {
        return Err(ApiError::BadRequest(format!(
            "day_of_week {} is outside 0-6",
            slot.day_of_week
        )));
    }

    let mut volunteer = Volunteer::new(
        req.user_id,
        req.skills,
        req.interests,
        req.description,
        Location::new(req.latitude, req.longitude),
    );
    volunteer.availability = req.availability;

    let volunteer = state.service.register_volunteer(volunteer).await?;
    Ok((StatusCode::CREATED, Json(volunteer.into())))
}

/// Rank open Needs for a Volunteer
async fn get_matches(
    State(state): State<AppState>,
    Path(volunteer_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> ApiResult<Json<Vec<Match>>> {
    let matches = state
        .service
        .matches_for_volunteer(&volunteer_id, query.effective())
        .await?;
    Ok(Json(matches))
}
