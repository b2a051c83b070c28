use std::str::FromStr;

use tokio_postgres::Row;
use tracing::instrument;

use crate::Match;
use crate::db::postings::PgStore;
use crate::db::store::{MatchStore, StoreError};
use crate::db::util::TimedClientExt;
use crate::taxonomy::QualityTier;

const UPSERT_MATCH_SQL: &str = "
INSERT INTO jm.matches (
    user_key,
    posting_hash,
    score,
    rationale,
    quality_tier,
    tags,
    match_run_id,
    matched_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
ON CONFLICT (user_key, posting_hash) DO UPDATE SET
    score = EXCLUDED.score,
    rationale = EXCLUDED.rationale,
    quality_tier = EXCLUDED.quality_tier,
    tags = EXCLUDED.tags,
    match_run_id = EXCLUDED.match_run_id,
    matched_at = EXCLUDED.matched_at";

const SELECT_USER_MATCHES_SQL: &str = "
SELECT user_key, posting_hash, score, rationale, quality_tier, tags, match_run_id, matched_at
FROM jm.matches
WHERE user_key = $1
ORDER BY score DESC, posting_hash";

fn row_to_match(row: &Row) -> Result<Match, StoreError> {
    let tier_raw: String = row.get("quality_tier");
    let quality_tier = QualityTier::from_str(&tier_raw)
        .map_err(|_| StoreError::Mapping(format!("unknown quality_tier {tier_raw:?}")))?;

    Ok(Match {
        user_key: row.get("user_key"),
        posting_hash: row.get("posting_hash"),
        score: row.get("score"),
        rationale: row.get("rationale"),
        quality_tier,
        tags: row.get("tags"),
        match_run_id: row.get("match_run_id"),
        matched_at: row.get("matched_at"),
    })
}

impl MatchStore for PgStore {
    #[instrument(skip(self, record), fields(user_key = %record.user_key, hash = %record.posting_hash))]
    async fn upsert_match(&self, record: &Match) -> Result<(), StoreError> {
        let client = self.pool().get().await?;
        client
            .timed_execute_cached(
                UPSERT_MATCH_SQL,
                &[
                    &record.user_key,
                    &record.posting_hash,
                    &record.score,
                    &record.rationale,
                    &record.quality_tier.as_ref(),
                    &record.tags,
                    &record.match_run_id,
                    &record.matched_at,
                ],
                "upsert_match",
            )
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn matches_for_user(&self, user_key: &str) -> Result<Vec<Match>, StoreError> {
        let client = self.pool().get().await?;
        let rows = client
            .timed_query_cached(SELECT_USER_MATCHES_SQL, &[&user_key], "matches_for_user")
            .await?;
        rows.iter().map(row_to_match).collect()
    }
}
