//! Error types for matching operations

use thiserror::Error;

pub type MatchResult<T> = std::result::Result<T, MatchError>;

#[derive(Debug, Error)]
pub enum MatchError {
    #[error("Invalid cell id: {0}")]
    InvalidCellId(String),

    #[error("Invalid spatial resolution: {0} (expected 0-15)")]
    InvalidResolution(u8),

    #[error("Invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },

    #[error("Failed to fetch candidate pool: {0}")]
    CandidatePoolFetchFailed(String),
}
