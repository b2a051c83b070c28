#![allow(async_fn_in_trait)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use deadpool_postgres::PoolError;
use serde::Serialize;
use thiserror::Error;
use tokio_postgres::Error as PgError;

use crate::{Match, Posting};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("postgres error: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to map stored row: {0}")]
    Mapping(String),
    #[error("store write timed out after {0:?}")]
    Timeout(Duration),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpsertOutcome::Inserted => "inserted",
            UpsertOutcome::Updated => "updated",
        }
    }
}

/// Persisted posting pool, keyed by content hash.
pub trait PostingStore {
    /// Insert a new hash or merge into the stored row (see
    /// [`Posting::merge_from`] for the merge rules).
    async fn upsert_posting(&self, posting: &Posting) -> Result<UpsertOutcome, StoreError>;

    /// Persist the classifier's fields (`active`, `filtered_reason`,
    /// `employer_display`, `categories`, `visa_friendly`) without touching
    /// `last_seen_at`.
    async fn save_classification(&self, posting: &Posting) -> Result<(), StoreError>;

    /// Active postings, most recent first.
    async fn load_active_pool(&self) -> Result<Vec<Posting>, StoreError>;

    /// Deactivate active postings last seen before `cutoff`. No filtered
    /// reason is set. Returns the number of postings deactivated.
    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count_postings(&self) -> Result<u64, StoreError>;
}

/// Match rows keyed by `(user_key, posting_hash)`.
pub trait MatchStore {
    async fn upsert_match(&self, record: &Match) -> Result<(), StoreError>;

    /// Matches of one user, best score first.
    async fn matches_for_user(&self, user_key: &str) -> Result<Vec<Match>, StoreError>;
}
