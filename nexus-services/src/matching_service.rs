//! Match orchestration
//!
//! Ties the embedding capability, the entity store, the ranker and the hub
//! together: new Needs and Volunteers are embedded and indexed, Needs are
//! ranked against volunteers and the matched users are notified.

use std::sync::Arc;

use chrono::Utc;
use nexus_core::{Match, Need, NeedStatus, Task, TaskStatus, Volunteer};
use nexus_embedding::Embedder;
use nexus_matching::{spatial, CandidatePool, MatchError, MatchRanker};
use thiserror::Error;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::hub::Hub;
use crate::store::{EntityStore, StoreError};

/// Matches pushed to volunteers when a Need is created
pub const NOTIFY_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Matching(#[from] MatchError),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result of pushing a Need's matches to the hub
#[derive(Debug, Clone)]
pub struct NotifySummary {
    pub matches: Vec<Match>,
    /// Connections that received the `new_need` event
    pub delivered: usize,
}

#[derive(Clone)]
pub struct MatchingService {
    store: Arc<EntityStore>,
    embedder: Arc<dyn Embedder>,
    ranker: MatchRanker,
    hub: Arc<Hub>,
    spatial_resolution: u8,
}

impl MatchingService {
    pub fn new(
        store: Arc<EntityStore>,
        embedder: Arc<dyn Embedder>,
        hub: Arc<Hub>,
        spatial_resolution: u8,
    ) -> Self {
        let pool: Arc<dyn CandidatePool> = store.clone();
        Self {
            store,
            embedder,
            ranker: MatchRanker::new(pool),
            hub,
            spatial_resolution,
        }
    }

    pub fn store(&self) -> &Arc<EntityStore> {
        &self.store
    }

    /// Index, embed and store a new Need, then notify its best volunteers
    ///
    /// A Need whose embedding cannot be generated is stored unmatchable and
    /// nobody is notified.
    #[instrument(skip(self, need), fields(need_id = %need.id))]
    pub async fn create_need(&self, mut need: Need) -> ServiceResult<(Need, NotifySummary)> {
        spatial::attach_cell(&mut need.location, self.spatial_resolution)?;

        need.embedding = match self.embedder.embed_need(&need).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!("Failed to embed need {}, storing without embedding: {}", need.id, e);
                None
            }
        };
        self.store.upsert_need(&need)?;

        let summary = if need.embedding.is_some() {
            match self.notify_matches(&need).await {
                Ok(summary) => summary,
                Err(e) => {
                    warn!("Failed to notify matches for need {}: {}", need.id, e);
                    NotifySummary {
                        matches: Vec::new(),
                        delivered: 0,
                    }
                }
            }
        } else {
            NotifySummary {
                matches: Vec::new(),
                delivered: 0,
            }
        };

        info!(
            "Created need {} ({} matches, {} deliveries)",
            need.id,
            summary.matches.len(),
            summary.delivered
        );
        Ok((need, summary))
    }

    /// Index, embed and store a Volunteer
    #[instrument(skip(self, volunteer), fields(volunteer_id = %volunteer.id))]
    pub async fn register_volunteer(&self, mut volunteer: Volunteer) -> ServiceResult<Volunteer> {
        spatial::attach_cell(&mut volunteer.location, self.spatial_resolution)?;

        volunteer.embedding = match self.embedder.embed_volunteer(&volunteer).await {
            Ok(embedding) => Some(embedding),
            Err(e) => {
                warn!(
                    "Failed to embed volunteer {}, storing without embedding: {}",
                    volunteer.id, e
                );
                None
            }
        };
        self.store.upsert_volunteer(&volunteer)?;

        info!("Registered volunteer {}", volunteer.id);
        Ok(volunteer)
    }

    pub async fn matches_for_need(&self, need_id: &str, limit: usize) -> ServiceResult<Vec<Match>> {
        let need = self.load_need(need_id)?;
        Ok(self.ranker.rank_for_need(&need, limit).await?)
    }

    pub async fn matches_for_volunteer(
        &self,
        volunteer_id: &str,
        limit: usize,
    ) -> ServiceResult<Vec<Match>> {
        let volunteer = self.load_volunteer(volunteer_id)?;
        Ok(self.ranker.rank_for_volunteer(&volunteer, limit).await?)
    }

    /// Re-rank a stored Need and push it to its matched volunteers
    pub async fn notify_matches_for_need(&self, need_id: &str) -> ServiceResult<NotifySummary> {
        let need = self.load_need(need_id)?;
        if !need.is_match_eligible(Utc::now()) {
            return Err(ServiceError::InvalidState(format!(
                "need {} is {} and cannot be matched",
                need.id, need.status
            )));
        }
        self.notify_matches(&need).await
    }

    /// A volunteer takes on a Need: mark it matched and tell both sides
    #[instrument(skip(self))]
    pub async fn accept_need(
        &self,
        need_id: &str,
        volunteer_id: &str,
        volunteer_name: &str,
    ) -> ServiceResult<Task> {
        let need = self.load_need(need_id)?;
        let volunteer = self.load_volunteer(volunteer_id)?;
        if need.status != NeedStatus::Requested {
            return Err(ServiceError::InvalidState(format!(
                "need {} is already {}",
                need.id, need.status
            )));
        }
        if self
            .store
            .transition_need_status(&need.id, NeedStatus::Requested, NeedStatus::Matched)?
            .is_none()
        {
            return Err(ServiceError::InvalidState(format!(
                "need {} was accepted by someone else",
                need.id
            )));
        }

        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4().to_string(),
            need_id: need.id.clone(),
            volunteer_id: volunteer.id.clone(),
            status: TaskStatus::Accepted,
            created_at: now,
            updated_at: now,
        };

        self.hub
            .notify_need_accepted(&need.user_id, &need.id, &volunteer.id, volunteer_name);
        self.hub
            .notify_task_status_update(&task, &[need.user_id.as_str(), volunteer.user_id.as_str()]);

        info!("Volunteer {} accepted need {}", volunteer.id, need.id);
        Ok(task)
    }

    async fn notify_matches(&self, need: &Need) -> ServiceResult<NotifySummary> {
        let matches = self.ranker.rank_for_need(need, NOTIFY_LIMIT).await?;

        let mut volunteer_users = Vec::with_capacity(matches.len());
        for m in &matches {
            match self.store.get_volunteer(&m.volunteer_id)? {
                Some(volunteer) => volunteer_users.push(volunteer.user_id),
                None => warn!("Matched volunteer {} disappeared", m.volunteer_id),
            }
        }

        let delivered = self.hub.notify_new_need(need, &volunteer_users);
        for m in &matches {
            self.hub.notify_new_match(m, &[need.user_id.as_str()]);
        }

        Ok(NotifySummary { matches, delivered })
    }

    fn load_need(&self, need_id: &str) -> ServiceResult<Need> {
        self.store
            .get_need(need_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("need {}", need_id)))
    }

    fn load_volunteer(&self, volunteer_id: &str) -> ServiceResult<Volunteer> {
        self.store
            .get_volunteer(volunteer_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("volunteer {}", volunteer_id)))
    }
}

impl std::fmt::Debug for MatchingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MatchingService")
            .field("spatial_resolution", &self.spatial_resolution)
            .finish_non_exhaustive()
    }
}
