use std::str::FromStr;

use chrono::{DateTime, Utc};
use tokio_postgres::Row;
use tracing::{instrument, warn};

use crate::Posting;
use crate::db::store::{PostingStore, StoreError, UpsertOutcome};
use crate::db::util::TimedClientExt;
use crate::db::PgPool;
use crate::taxonomy::{Category, FilteredReason, VisaFriendly, WorkMode};

const UPSERT_POSTING_SQL: &str = "
INSERT INTO jm.postings AS p (
    hash,
    title,
    employer_raw,
    employer_display,
    location,
    description,
    source_url,
    origin_source,
    categories,
    is_internship,
    is_graduate_program,
    visa_friendly,
    work_mode,
    active,
    filtered_reason,
    posted_at,
    last_seen_at,
    created_at
) VALUES (
    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18
)
ON CONFLICT (hash) DO UPDATE SET
    title = EXCLUDED.title,
    employer_raw = EXCLUDED.employer_raw,
    employer_display = EXCLUDED.employer_display,
    location = EXCLUDED.location,
    description = EXCLUDED.description,
    source_url = EXCLUDED.source_url,
    origin_source = EXCLUDED.origin_source,
    categories = ARRAY(
        SELECT DISTINCT c FROM unnest(p.categories || EXCLUDED.categories) AS c ORDER BY c
    ),
    is_internship = EXCLUDED.is_internship,
    is_graduate_program = EXCLUDED.is_graduate_program,
    visa_friendly = COALESCE(EXCLUDED.visa_friendly, p.visa_friendly),
    work_mode = CASE
        WHEN EXCLUDED.work_mode = 'unknown' THEN p.work_mode
        ELSE EXCLUDED.work_mode
    END,
    active = EXCLUDED.active,
    filtered_reason = EXCLUDED.filtered_reason,
    posted_at = COALESCE(EXCLUDED.posted_at, p.posted_at),
    last_seen_at = GREATEST(p.last_seen_at, EXCLUDED.last_seen_at)
RETURNING (xmax = 0) AS inserted";

const SAVE_CLASSIFICATION_SQL: &str = "
UPDATE jm.postings
SET active = $2,
    filtered_reason = $3,
    employer_display = $4,
    categories = $5,
    visa_friendly = COALESCE($6, visa_friendly)
WHERE hash = $1";

const SELECT_ACTIVE_SQL: &str = "
SELECT
    hash,
    title,
    employer_raw,
    employer_display,
    location,
    description,
    source_url,
    origin_source,
    categories,
    is_internship,
    is_graduate_program,
    visa_friendly,
    work_mode,
    active,
    filtered_reason,
    posted_at,
    last_seen_at,
    created_at
FROM jm.postings
WHERE active
ORDER BY COALESCE(posted_at, created_at) DESC, hash";

const DEACTIVATE_STALE_SQL: &str = "
UPDATE jm.postings
SET active = FALSE
WHERE active AND last_seen_at < $1";

/// Postgres-backed posting and match store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn category_slugs(posting: &Posting) -> Vec<String> {
    posting
        .categories
        .iter()
        .map(|c| c.slug().to_string())
        .collect()
}

fn row_to_posting(row: &Row) -> Result<Posting, StoreError> {
    let hash: String = row.get("hash");

    let categories = row
        .get::<_, Vec<String>>("categories")
        .into_iter()
        .filter_map(|slug| {
            let parsed = Category::from_slug(&slug);
            if parsed.is_none() {
                warn!(hash = %hash, slug = %slug, "unknown category slug ignored");
            }
            parsed
        })
        .collect();

    let filtered_reason = row
        .get::<_, Option<String>>("filtered_reason")
        .map(|raw| {
            FilteredReason::from_str(&raw)
                .map_err(|_| StoreError::Mapping(format!("unknown filtered_reason {raw:?}")))
        })
        .transpose()?;

    let work_mode_raw: String = row.get("work_mode");
    let work_mode = WorkMode::from_str(&work_mode_raw)
        .map_err(|_| StoreError::Mapping(format!("unknown work_mode {work_mode_raw:?}")))?;

    Ok(Posting {
        title: row.get("title"),
        employer_raw: row.get("employer_raw"),
        employer_display: row.get("employer_display"),
        location: row.get("location"),
        description: row.get("description"),
        source_url: row.get("source_url"),
        origin_source: row.get("origin_source"),
        categories,
        is_internship: row.get("is_internship"),
        is_graduate_program: row.get("is_graduate_program"),
        visa_friendly: VisaFriendly::from_db(row.get("visa_friendly")),
        work_mode,
        active: row.get("active"),
        filtered_reason,
        posted_at: row.get::<_, Option<DateTime<Utc>>>("posted_at"),
        last_seen_at: row.get("last_seen_at"),
        created_at: row.get("created_at"),
        hash,
    })
}

impl PostingStore for PgStore {
    #[instrument(skip(self, posting), fields(hash = %posting.hash))]
    async fn upsert_posting(&self, posting: &Posting) -> Result<UpsertOutcome, StoreError> {
        let client = self.pool.get().await?;
        let categories = category_slugs(posting);
        let visa = posting.visa_friendly.to_db();
        let filtered_reason = posting.filtered_reason.map(|r| r.as_str());

        let row = client
            .timed_query_one_cached(
                UPSERT_POSTING_SQL,
                &[
                    &posting.hash,
                    &posting.title,
                    &posting.employer_raw,
                    &posting.employer_display,
                    &posting.location,
                    &posting.description,
                    &posting.source_url,
                    &posting.origin_source,
                    &categories,
                    &posting.is_internship,
                    &posting.is_graduate_program,
                    &visa,
                    &posting.work_mode.as_ref(),
                    &posting.active,
                    &filtered_reason,
                    &posting.posted_at,
                    &posting.last_seen_at,
                    &posting.created_at,
                ],
                "upsert_posting",
            )
            .await?;

        let inserted: bool = row.get("inserted");
        Ok(if inserted {
            UpsertOutcome::Inserted
        } else {
            UpsertOutcome::Updated
        })
    }

    #[instrument(skip(self, posting), fields(hash = %posting.hash))]
    async fn save_classification(&self, posting: &Posting) -> Result<(), StoreError> {
        let client = self.pool.get().await?;
        let categories = category_slugs(posting);
        let visa = posting.visa_friendly.to_db();
        let filtered_reason = posting.filtered_reason.map(|r| r.as_str());

        client
            .timed_execute_cached(
                SAVE_CLASSIFICATION_SQL,
                &[
                    &posting.hash,
                    &posting.active,
                    &filtered_reason,
                    &posting.employer_display,
                    &categories,
                    &visa,
                ],
                "save_classification",
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_active_pool(&self) -> Result<Vec<Posting>, StoreError> {
        let client = self.pool.get().await?;
        let rows = client
            .timed_query_cached(SELECT_ACTIVE_SQL, &[], "load_active_pool")
            .await?;
        rows.iter().map(row_to_posting).collect()
    }

    #[instrument(skip(self))]
    async fn deactivate_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let affected = client
            .timed_execute_cached(DEACTIVATE_STALE_SQL, &[&cutoff], "deactivate_stale")
            .await?;
        Ok(affected)
    }

    #[instrument(skip(self))]
    async fn count_postings(&self) -> Result<u64, StoreError> {
        let client = self.pool.get().await?;
        let row = client
            .timed_query_one_cached("SELECT COUNT(*) FROM jm.postings", &[], "count_postings")
            .await?;
        let count: i64 = row.get(0);
        Ok(count.max(0) as u64)
    }
}
