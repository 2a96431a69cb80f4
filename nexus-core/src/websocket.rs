//! WebSocket message types for real-time notifications
//!
//! These types define the protocol between the Hub and connected clients.
//! Every application frame is an envelope of the form
//! `{ "type": ..., "payload": {...}, "user_id"?: ... }`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Match, Need, Task, TaskStatus, Urgency};

// ============================================================================
// Client -> Server Messages
// ============================================================================

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// First frame after connect, carrying a bearer credential
    Auth {
        token: String,
    },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

/// Payload construction errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("Payload field `{0}` must not be empty")]
    EmptyField(&'static str),

    #[error("Invalid match score: {0}")]
    InvalidScore(f64),

    #[error("Invalid distance: {0}")]
    InvalidDistance(f64),
}

fn require(field: &'static str, value: String) -> Result<String, PayloadError> {
    if value.trim().is_empty() {
        Err(PayloadError::EmptyField(field))
    } else {
        Ok(value)
    }
}

/// Greeting sent once a connection is registered
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectedPayload {
    user_id: String,
    message: String,
}

impl ConnectedPayload {
    pub fn new(user_id: impl Into<String>) -> Result<Self, PayloadError> {
        Ok(Self {
            user_id: require("user_id", user_id.into())?,
            message: "Connected to NeighborNexus".to_string(),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }
}

/// A new Need that may interest the recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewNeedPayload {
    need_id: String,
    title: String,
    urgency: Urgency,
}

impl NewNeedPayload {
    pub fn new(
        need_id: impl Into<String>,
        title: impl Into<String>,
        urgency: Urgency,
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            need_id: require("need_id", need_id.into())?,
            title: require("title", title.into())?,
            urgency,
        })
    }

    pub fn from_need(need: &Need) -> Result<Self, PayloadError> {
        Self::new(need.id.clone(), need.title.clone(), need.urgency)
    }

    pub fn need_id(&self) -> &str {
        &self.need_id
    }
}

/// A volunteer accepted the recipient's Need
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeedAcceptedPayload {
    need_id: String,
    volunteer_id: String,
    volunteer_name: String,
}

impl NeedAcceptedPayload {
    pub fn new(
        need_id: impl Into<String>,
        volunteer_id: impl Into<String>,
        volunteer_name: impl Into<String>,
    ) -> Result<Self, PayloadError> {
        Ok(Self {
            need_id: require("need_id", need_id.into())?,
            volunteer_id: require("volunteer_id", volunteer_id.into())?,
            volunteer_name: require("volunteer_name", volunteer_name.into())?,
        })
    }
}

/// A Task changed status
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaskStatusPayload {
    task_id: String,
    status: TaskStatus,
}

impl TaskStatusPayload {
    pub fn new(task_id: impl Into<String>, status: TaskStatus) -> Result<Self, PayloadError> {
        Ok(Self {
            task_id: require("task_id", task_id.into())?,
            status,
        })
    }

    pub fn from_task(task: &Task) -> Result<Self, PayloadError> {
        Self::new(task.id.clone(), task.status)
    }
}

/// A new Match involving the recipient
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewMatchPayload {
    /// Matches are not stored; the Need id identifies them on the wire
    match_id: String,
    need_id: String,
    volunteer_id: String,
    score: f64,
    distance: f64,
}

impl NewMatchPayload {
    pub fn from_match(m: &Match) -> Result<Self, PayloadError> {
        if !m.score.is_finite() || !(-1.0..=1.0).contains(&m.score) {
            return Err(PayloadError::InvalidScore(m.score));
        }
        if !m.distance.is_finite() || m.distance < 0.0 {
            return Err(PayloadError::InvalidDistance(m.distance));
        }
        let need_id = require("need_id", m.need_id.clone())?;
        Ok(Self {
            match_id: need_id.clone(),
            need_id,
            volunteer_id: require("volunteer_id", m.volunteer_id.clone())?,
            score: m.score,
            distance: m.distance,
        })
    }

    pub fn score(&self) -> f64 {
        self.score
    }
}

/// Events pushed from server to client
///
/// A closed set: each `type` on the wire has exactly one payload shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected(ConnectedPayload),
    NewNeed(NewNeedPayload),
    NeedAccepted(NeedAcceptedPayload),
    TaskStatusUpdate(TaskStatusPayload),
    NewMatch(NewMatchPayload),
}

impl ServerEvent {
    /// Wire name of this event's `type`
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected(_) => "connected",
            ServerEvent::NewNeed(_) => "new_need",
            ServerEvent::NeedAccepted(_) => "need_accepted",
            ServerEvent::TaskStatusUpdate(_) => "task_status_update",
            ServerEvent::NewMatch(_) => "new_match",
        }
    }

    pub fn into_envelope(self, user_id: Option<String>) -> Envelope {
        Envelope {
            event: self,
            user_id,
        }
    }
}

/// Wire envelope around a [`ServerEvent`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub event: ServerEvent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

// ============================================================================
// Connection lifecycle
// ============================================================================

/// Lifecycle phase of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    /// Transport open, waiting for authentication
    Connecting,
    /// Authenticated and present in the registry
    Registered,
    /// Being removed from the registry
    Unregistering,
    /// Transport closed
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_envelope_shape() {
        let event = ServerEvent::NewNeed(
            NewNeedPayload::new("need-1", "Groceries", Urgency::High).unwrap(),
        );
        let json = serde_json::to_value(event.into_envelope(Some("user-9".into()))).unwrap();

        assert_eq!(json["type"], "new_need");
        assert_eq!(json["payload"]["need_id"], "need-1");
        assert_eq!(json["payload"]["urgency"], "high");
        assert_eq!(json["user_id"], "user-9");
    }

    #[test]
    fn test_envelope_without_user_id() {
        let event = ServerEvent::Connected(ConnectedPayload::new("u1").unwrap());
        let json = serde_json::to_value(event.into_envelope(None)).unwrap();
        assert_eq!(json["type"], "connected");
        assert!(json.get("user_id").is_none());
        assert_eq!(json["payload"]["user_id"], "u1");
    }

    #[test]
    fn test_payload_validation() {
        assert_eq!(
            NewNeedPayload::new("", "title", Urgency::Low),
            Err(PayloadError::EmptyField("need_id"))
        );
        assert_eq!(
            NeedAcceptedPayload::new("n1", "v1", "  "),
            Err(PayloadError::EmptyField("volunteer_name"))
        );

        let bad = Match {
            need_id: "n1".into(),
            volunteer_id: "v1".into(),
            score: f64::NAN,
            distance: 10.0,
            created_at: Utc::now(),
        };
        assert!(matches!(
            NewMatchPayload::from_match(&bad),
            Err(PayloadError::InvalidScore(_))
        ));
    }

    #[test]
    fn test_new_match_payload() {
        let m = Match {
            need_id: "n1".into(),
            volunteer_id: "v1".into(),
            score: 0.74,
            distance: 2000.0,
            created_at: Utc::now(),
        };
        let event = ServerEvent::NewMatch(NewMatchPayload::from_match(&m).unwrap());
        assert_eq!(event.kind(), "new_match");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"]["match_id"], "n1");
        assert_eq!(json["payload"]["volunteer_id"], "v1");
    }

    #[test]
    fn test_parse_auth_message() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","payload":{"token":"abc"}}"#).unwrap();
        match msg {
            ClientMessage::Auth { token } => assert_eq!(token, "abc"),
        }

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"subscribe"}"#).is_err());
    }
}
