//! Match ranking
//!
//! `score = cosine_similarity * decay_score(distance)`. Only pairs scoring
//! strictly above [`ACCEPTANCE_THRESHOLD`] become Matches. Results are ordered
//! by score (descending), then distance (ascending), then candidate id.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use nexus_core::{Location, Match, Need, Volunteer};
use nexus_embedding::cosine_similarity;
use tracing::{debug, info, instrument};

use crate::{
    error::MatchResult,
    geo::{decay_score, distance_meters},
    pool::CandidatePool,
};

/// Minimum combined score for a pair to become a Match
pub const ACCEPTANCE_THRESHOLD: f64 = 0.3;

/// Result size used when the caller passes no limit
pub const DEFAULT_LIMIT: usize = 10;

/// Anything that can be scored against the opposite side of a match
pub trait Candidate {
    fn candidate_id(&self) -> &str;
    fn embedding(&self) -> Option<&[f32]>;
    fn location(&self) -> &Location;
}

impl Candidate for Need {
    fn candidate_id(&self) -> &str {
        &self.id
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

impl Candidate for Volunteer {
    fn candidate_id(&self) -> &str {
        &self.id
    }

    fn embedding(&self) -> Option<&[f32]> {
        self.embedding.as_deref().filter(|e| !e.is_empty())
    }

    fn location(&self) -> &Location {
        &self.location
    }
}

/// Combine a similarity with a distance (meters)
pub fn combined_score(similarity: f64, distance_m: f64) -> f64 {
    similarity * decay_score(distance_m)
}

#[derive(Debug)]
struct Scored<'a> {
    candidate_id: &'a str,
    score: f64,
    distance: f64,
}

fn effective_limit(limit: usize) -> usize {
    if limit == 0 { DEFAULT_LIMIT } else { limit }
}

/// Score descending, then distance ascending, then candidate id
fn rank_order(a: &Scored<'_>, b: &Scored<'_>) -> Ordering {
    b.score
        .partial_cmp(&a.score)
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.distance.total_cmp(&b.distance))
        .then_with(|| a.candidate_id.cmp(b.candidate_id))
}

/// Score, filter, order, dedupe and truncate candidates against `subject`
fn rank_candidates<'a, S, C, I>(subject: &S, candidates: I, limit: usize) -> Vec<Scored<'a>>
where
    S: Candidate + ?Sized,
    C: Candidate + 'a,
    I: IntoIterator<Item = &'a C>,
{
    let Some(subject_embedding) = subject.embedding() else {
        debug!(
            "{} has no embedding yet, nothing to rank",
            subject.candidate_id()
        );
        return Vec::new();
    };

    let mut scored: Vec<Scored<'a>> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let embedding = candidate.embedding()?;

            let similarity = match cosine_similarity(subject_embedding, embedding) {
                Ok(similarity) => similarity,
                Err(e) => {
                    debug!("Skipping candidate {}: {}", candidate.candidate_id(), e);
                    return None;
                }
            };

            let distance = distance_meters(subject.location(), candidate.location());
            let score = combined_score(similarity, distance);

            (score > ACCEPTANCE_THRESHOLD).then_some(Scored {
                candidate_id: candidate.candidate_id(),
                score,
                distance,
            })
        })
        .collect();

    scored.sort_by(rank_order);

    let mut seen = HashSet::new();
    scored.retain(|s| seen.insert(s.candidate_id));
    scored.truncate(effective_limit(limit));

    scored
}

/// Rank volunteers for a Need
///
/// `limit == 0` means [`DEFAULT_LIMIT`]. Volunteers without an embedding
/// and volunteers whose embedding cannot be compared are skipped.
pub fn rank_for_need(need: &Need, volunteers: &[Volunteer], limit: usize) -> Vec<Match> {
    let created_at = Utc::now();
    rank_candidates(need, volunteers, limit)
        .into_iter()
        .map(|s| Match {
            need_id: need.id.clone(),
            volunteer_id: s.candidate_id.to_string(),
            score: s.score,
            distance: s.distance,
            created_at,
        })
        .collect()
}

/// Rank open Needs for a Volunteer
///
/// Needs that are not match-eligible at `now` are ignored even if the pool
/// returned them.
pub fn rank_for_volunteer(
    volunteer: &Volunteer,
    needs: &[Need],
    now: chrono::DateTime<Utc>,
    limit: usize,
) -> Vec<Match> {
    let eligible = needs.iter().filter(|n| n.is_match_eligible(now));
    rank_candidates(volunteer, eligible, limit)
        .into_iter()
        .map(|s| Match {
            need_id: s.candidate_id.to_string(),
            volunteer_id: volunteer.id.clone(),
            score: s.score,
            distance: s.distance,
            created_at: now,
        })
        .collect()
}

/// Ranker bound to a candidate pool
///
/// Each call fetches a fresh snapshot; a failed fetch aborts that ranking
/// with [`crate::MatchError::CandidatePoolFetchFailed`].
#[derive(Clone)]
pub struct MatchRanker {
    pool: Arc<dyn CandidatePool>,
}

impl MatchRanker {
    pub fn new(pool: Arc<dyn CandidatePool>) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, need), fields(need_id = %need.id))]
    pub async fn rank_for_need(&self, need: &Need, limit: usize) -> MatchResult<Vec<Match>> {
        let volunteers = self.pool.volunteers().await?;
        let matches = rank_for_need(need, &volunteers, limit);

        info!(
            "Ranked {} volunteers for need {}: {} matches",
            volunteers.len(),
            need.id,
            matches.len()
        );
        Ok(matches)
    }

    #[instrument(skip(self, volunteer), fields(volunteer_id = %volunteer.id))]
    pub async fn rank_for_volunteer(
        &self,
        volunteer: &Volunteer,
        limit: usize,
    ) -> MatchResult<Vec<Match>> {
        let now = Utc::now();
        let needs = self.pool.open_needs(now).await?;
        let matches = rank_for_volunteer(volunteer, &needs, now, limit);

        info!(
            "Ranked {} needs for volunteer {}: {} matches",
            needs.len(),
            volunteer.id,
            matches.len()
        );
        Ok(matches)
    }
}

impl std::fmt::Debug for MatchRanker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchRanker").finish_non_exhaustive()
    }
}
