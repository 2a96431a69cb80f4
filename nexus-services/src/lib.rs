//! Service layer for NeighborNexus
//!
//! This crate provides the real-time notification hub, the SQLite entity
//! store and the service that embeds, ranks and notifies.

pub mod auth;
pub mod hub;
pub mod matching_service;
pub mod store;

pub use auth::{sign_token, AuthError, Authenticator, HmacAuthenticator};
pub use hub::{
    serve_connection, ConnectionId, Hub, HubConfig, HubError, HubResult,
    OverflowPolicy, Registration,
};
pub use matching_service::{
    MatchingService, NotifySummary, ServiceError, ServiceResult, NOTIFY_LIMIT,
};
pub use store::{EntityStore, StoreError};
