//! Notification hub for real-time delivery to connected clients
//!
//! The [`Hub`] owns every live connection. Producers (need creation, task
//! updates, the matcher) push typed [`nexus_core::ServerEvent`]s into it and
//! the hub fans them out to the bounded queue of each targeted connection.
//! [`serve_connection`] drives one transport from authentication to close.

mod connection;
mod registry;

use std::time::Duration;

use thiserror::Error;

pub use connection::serve_connection;
pub use registry::{ConnectionId, Hub, Registration};

/// What to do when a connection's outbound queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Remove the slow connection and close its queue
    #[default]
    Evict,
    /// Keep the connection, drop only the new message for it
    DropMessage,
}

impl std::str::FromStr for OverflowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "evict" => Ok(OverflowPolicy::Evict),
            "drop" | "drop_message" => Ok(OverflowPolicy::DropMessage),
            other => Err(format!("unknown overflow policy: {}", other)),
        }
    }
}

/// Hub tuning
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Outbound queue capacity per connection
    pub queue_capacity: usize,
    pub overflow: OverflowPolicy,
    /// Silence allowed on the inbound side; refreshed by every pong
    pub read_deadline: Duration,
    /// Must be shorter than `read_deadline`
    pub ping_interval: Duration,
    pub write_deadline: Duration,
    /// Inbound frames above this size end the connection
    pub max_frame_bytes: usize,
    /// Time allowed for the first (auth) frame
    pub auth_timeout: Duration,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            overflow: OverflowPolicy::Evict,
            read_deadline: Duration::from_secs(60),
            ping_interval: Duration::from_secs(54),
            write_deadline: Duration::from_secs(10),
            max_frame_bytes: 512,
            auth_timeout: Duration::from_secs(60),
        }
    }
}

/// Hub errors
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Hub is shutting down")]
    ShuttingDown,

    #[error("Failed to serialize event: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type HubResult<T> = Result<T, HubError>;
