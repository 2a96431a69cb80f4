//! Domain model: Needs, Volunteers, Tasks and Matches

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NexusError;

/// Embedding vector produced by the embedding capability
pub type EmbeddingVector = Vec<f32>;

/// Needs expire one week after creation unless the caller says otherwise
pub const DEFAULT_NEED_TTL_DAYS: i64 = 7;

/// Geographic location of a Need or Volunteer
///
/// `latitude`/`longitude` are exact and only used inside the scoring
/// boundary. `cell` is the coarse spatial cell identifier that is safe to
/// hand to other parties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Privacy-preserving spatial cell (hex encoded)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            cell: None,
            address: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

/// Urgency of a Need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Low => "low",
            Urgency::Medium => "medium",
            Urgency::High => "high",
        }
    }
}

impl fmt::Display for Urgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Urgency {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Urgency::Low),
            "medium" => Ok(Urgency::Medium),
            "high" => Ok(Urgency::High),
            other => Err(NexusError::invalid_input(format!("unknown urgency: {}", other))),
        }
    }
}

/// Lifecycle status of a Need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeedStatus {
    Requested,
    Matched,
    InProgress,
    Completed,
    Cancelled,
}

impl NeedStatus {
    /// Statuses a Need can be in and still take part in matching
    pub const OPEN: [NeedStatus; 2] = [NeedStatus::Requested, NeedStatus::Matched];

    pub fn as_str(&self) -> &'static str {
        match self {
            NeedStatus::Requested => "requested",
            NeedStatus::Matched => "matched",
            NeedStatus::InProgress => "in_progress",
            NeedStatus::Completed => "completed",
            NeedStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl fmt::Display for NeedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NeedStatus {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "requested" => Ok(NeedStatus::Requested),
            "matched" => Ok(NeedStatus::Matched),
            "in_progress" => Ok(NeedStatus::InProgress),
            "completed" => Ok(NeedStatus::Completed),
            "cancelled" => Ok(NeedStatus::Cancelled),
            other => Err(NexusError::invalid_input(format!("unknown need status: {}", other))),
        }
    }
}

/// A request for help
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Need {
    pub id: String,
    /// Owner of the Need (the user asking for help)
    pub user_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub urgency: Urgency,
    /// Expected duration in minutes
    pub duration: u32,
    pub location: Location,
    pub status: NeedStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Need {
    /// Create a new `requested` Need with a fresh id and the default expiry
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        urgency: Urgency,
        location: Location,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: title.into(),
            description: description.into(),
            category: category.into(),
            urgency,
            duration: 0,
            location,
            status: NeedStatus::Requested,
            embedding: None,
            created_at: now,
            updated_at: now,
            expires_at: Some(now + Duration::days(DEFAULT_NEED_TTL_DAYS)),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expires_at| expires_at <= now)
    }

    /// Only open, unexpired Needs are offered to volunteers
    pub fn is_match_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status.is_open() && !self.is_expired(now)
    }
}

/// A weekly availability window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Availability {
    /// 0 = Sunday, 1 = Monday, ...
    pub day_of_week: u8,
    /// "09:00"
    pub start_time: String,
    /// "17:00"
    pub end_time: String,
}

/// A helper profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volunteer {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    pub description: String,
    #[serde(default)]
    pub availability: Vec<Availability>,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<EmbeddingVector>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub task_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Volunteer {
    pub fn new(
        user_id: impl Into<String>,
        skills: Vec<String>,
        interests: Vec<String>,
        description: impl Into<String>,
        location: Location,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            skills,
            interests,
            description: description.into(),
            availability: Vec::new(),
            location,
            embedding: None,
            rating: 0.0,
            task_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Status of a Task (an accepted Need being worked on)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Accepted,
    InProgress,
    Completed,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Accepted => "accepted",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for TaskStatus {
    type Err = NexusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(TaskStatus::Accepted),
            "in_progress" => Ok(TaskStatus::InProgress),
            "completed" => Ok(TaskStatus::Completed),
            "cancelled" => Ok(TaskStatus::Cancelled),
            other => Err(NexusError::invalid_input(format!("unknown task status: {}", other))),
        }
    }
}

/// A matched Need being worked on by a Volunteer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub need_id: String,
    pub volunteer_id: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A scored pairing of a Need with a Volunteer
///
/// Derived on demand by the ranker and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub need_id: String,
    pub volunteer_id: String,
    /// Combined score: semantic similarity times distance decay
    pub score: f64,
    /// Great-circle distance in meters
    pub distance: f64,
    pub created_at: DateTime<Utc>,
}
