//! Candidate pools supplied to the ranker

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{Need, Volunteer};

use crate::error::MatchResult;

/// Read-only source of ranking candidates
///
/// Implementations return an independent snapshot per call, so concurrent
/// ranking passes never contend with each other.
#[async_trait]
pub trait CandidatePool: Send + Sync {
    /// Every volunteer (candidates for ranking a Need)
    async fn volunteers(&self) -> MatchResult<Vec<Volunteer>>;

    /// Needs that are open and not expired at `now` (candidates for ranking a Volunteer)
    async fn open_needs(&self, now: DateTime<Utc>) -> MatchResult<Vec<Need>>;
}

/// Fixed in-memory candidate pool
#[derive(Debug, Clone, Default)]
pub struct InMemoryPool {
    needs: Vec<Need>,
    volunteers: Vec<Volunteer>,
}

impl InMemoryPool {
    pub fn with_entries(needs: Vec<Need>, volunteers: Vec<Volunteer>) -> Self {
        Self { needs, volunteers }
    }
}

#[async_trait]
impl CandidatePool for InMemoryPool {
    async fn volunteers(&self) -> MatchResult<Vec<Volunteer>> {
        Ok(self.volunteers.clone())
    }

    async fn open_needs(&self, now: DateTime<Utc>) -> MatchResult<Vec<Need>> {
        Ok(self
            .needs
            .iter()
            .filter(|n| n.is_match_eligible(now))
            .cloned()
            .collect())
    }
}
