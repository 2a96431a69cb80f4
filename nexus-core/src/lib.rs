//! Core types for the NeighborNexus matching core
//!
//! This crate defines the shared data structures used across the workspace,
//! including Needs, Volunteers, Matches and the Hub wire protocol.

pub mod error;
pub mod model;
pub mod websocket;

pub use error::{NexusError, NexusResult};
pub use model::{
    Availability, EmbeddingVector, Location, Match, Need, NeedStatus, Task, TaskStatus, Urgency,
    Volunteer, DEFAULT_NEED_TTL_DAYS,
};
pub use websocket::{
    ClientMessage, ConnectedPayload, ConnectionPhase, Envelope, NeedAcceptedPayload,
    NewMatchPayload, NewNeedPayload, PayloadError, ServerEvent, TaskStatusPayload,
};
