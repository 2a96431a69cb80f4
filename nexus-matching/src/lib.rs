//! Match ranking for NeighborNexus
//!
//! Scores Volunteers against a Need (and Needs against a Volunteer) by
//! multiplying semantic similarity with a distance decay, keeps the pairs
//! above the acceptance threshold and ranks them.
//!
//! ## Modules
//! - [`geo`]: haversine distance and distance decay
//! - [`spatial`]: privacy-preserving H3 cell encoding and neighborhood lookup
//! - [`ranker`]: candidate scoring, thresholding and ordering
//! - [`pool`]: source of candidates for ranking

pub mod error;
pub mod geo;
pub mod pool;
pub mod ranker;
pub mod spatial;

pub use error::{MatchError, MatchResult};
pub use geo::{decay_score, distance_meters};
pub use pool::{CandidatePool, InMemoryPool};
pub use ranker::{
    combined_score, rank_for_need, rank_for_volunteer, Candidate, MatchRanker,
    ACCEPTANCE_THRESHOLD, DEFAULT_LIMIT,
};
pub use spatial::{attach_cell, cells_within_radius, decode, encode, CellId};
