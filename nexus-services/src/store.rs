//! Entity Store
//!
//! SQLite-based storage for Needs and Volunteers. Entities are kept as JSON
//! documents; the columns used for filtering (status, expiry) are mirrored
//! next to the document.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use nexus_core::{Need, NeedStatus, Volunteer};
use nexus_matching::{CandidatePool, MatchError, MatchResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::debug;

/// Need and Volunteer storage using SQLite
pub struct EntityStore {
    conn: Mutex<Connection>,
}

impl EntityStore {
    /// Open (or create) the database file and its tables
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Io(format!("Failed to create database directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    /// Create an in-memory store (useful for testing)
    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;

        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS needs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL,
                expires_at INTEGER,
                doc TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_needs_open
            ON needs(status, expires_at);

            CREATE TABLE IF NOT EXISTS volunteers (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                doc TEXT NOT NULL
            );
            "#,
        )?;

        Ok(())
    }

    /// Insert or replace a Need
    pub fn upsert_need(&self, need: &Need) -> Result<(), StoreError> {
        let doc = serde_json::to_string(need)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute(
            r#"
            INSERT OR REPLACE INTO needs (id, user_id, status, expires_at, doc)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                need.id,
                need.user_id,
                need.status.as_str(),
                need.expires_at.map(|t| t.timestamp_millis()),
                doc,
            ],
        )?;

        debug!("Stored need {}", need.id);
        Ok(())
    }

    /// Insert or replace a Volunteer
    pub fn upsert_volunteer(&self, volunteer: &Volunteer) -> Result<(), StoreError> {
        let doc = serde_json::to_string(volunteer)?;
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        conn.execute(
            "INSERT OR REPLACE INTO volunteers (id, user_id, doc) VALUES (?1, ?2, ?3)",
            params![volunteer.id, volunteer.user_id, doc],
        )?;

        debug!("Stored volunteer {}", volunteer.id);
        Ok(())
    }

    pub fn get_need(&self, id: &str) -> Result<Option<Need>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let doc: Option<String> = conn
            .query_row("SELECT doc FROM needs WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .optional()?;

        doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    pub fn get_volunteer(&self, id: &str) -> Result<Option<Volunteer>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM volunteers WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;

        doc.map(|d| serde_json::from_str(&d).map_err(StoreError::from))
            .transpose()
    }

    /// Change a Need's status; returns the updated Need, or None if unknown
    pub fn set_need_status(&self, id: &str, status: NeedStatus) -> Result<Option<Need>, StoreError> {
        self.update_need_status(id, None, status)
    }

    /// Move a Need from `from` to `to` as one step
    ///
    /// Returns None when the Need is unknown or no longer in `from`.
    pub fn transition_need_status(
        &self,
        id: &str,
        from: NeedStatus,
        to: NeedStatus,
    ) -> Result<Option<Need>, StoreError> {
        self.update_need_status(id, Some(from), to)
    }

    fn update_need_status(
        &self,
        id: &str,
        from: Option<NeedStatus>,
        to: NeedStatus,
    ) -> Result<Option<Need>, StoreError> {
        let from = from.map(|s| s.as_str());
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;

        let doc: Option<String> = conn
            .query_row(
                "SELECT doc FROM needs WHERE id = ?1 AND (?2 IS NULL OR status = ?2)",
                params![id, from],
                |row| row.get(0),
            )
            .optional()?;
        let Some(doc) = doc else {
            return Ok(None);
        };

        let mut need: Need = serde_json::from_str(&doc)?;
        need.status = to;
        need.updated_at = Utc::now();
        let doc = serde_json::to_string(&need)?;

        let changed = conn.execute(
            "UPDATE needs SET status = ?1, doc = ?2 WHERE id = ?3 AND (?4 IS NULL OR status = ?4)",
            params![to.as_str(), doc, id, from],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        debug!("Need {} is now {}", id, to);
        Ok(Some(need))
    }

    pub fn list_volunteers(&self) -> Result<Vec<Volunteer>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let mut stmt = conn.prepare("SELECT doc FROM volunteers ORDER BY id")?;

        let docs = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;

        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(StoreError::from))
            .collect()
    }

    /// Needs that are open (`requested`/`matched`) and not expired at `now`
    pub fn list_open_needs(&self, now: DateTime<Utc>) -> Result<Vec<Need>, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let mut stmt = conn.prepare(
            r#"
            SELECT doc FROM needs
            WHERE status IN (?1, ?2) AND (expires_at IS NULL OR expires_at > ?3)
            ORDER BY id
            "#,
        )?;

        let docs = stmt
            .query_map(
                params![
                    NeedStatus::Requested.as_str(),
                    NeedStatus::Matched.as_str(),
                    now.timestamp_millis()
                ],
                |row| row.get::<_, String>(0),
            )?
            .collect::<Result<Vec<_>, _>>()?;

        docs.iter()
            .map(|d| serde_json::from_str(d).map_err(StoreError::from))
            .collect()
    }

    pub fn need_count(&self) -> Result<usize, StoreError> {
        let conn = self.conn.lock().map_err(|_| StoreError::LockError)?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM needs", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl CandidatePool for EntityStore {
    async fn volunteers(&self) -> MatchResult<Vec<Volunteer>> {
        self.list_volunteers()
            .map_err(|e| MatchError::CandidatePoolFetchFailed(e.to_string()))
    }

    async fn open_needs(&self, now: DateTime<Utc>) -> MatchResult<Vec<Need>> {
        self.list_open_needs(now)
            .map_err(|e| MatchError::CandidatePoolFetchFailed(e.to_string()))
    }
}

impl std::fmt::Debug for EntityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityStore").finish_non_exhaustive()
    }
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to acquire lock")]
    LockError,
}
