use deadpool_postgres::PoolError;
use thiserror::Error;
use tokio_postgres::Error as PgError;
use tracing::{info, instrument};

use crate::db::{DbPoolError, PgPool};

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("failed to get postgres connection: {0}")]
    Pool(#[from] PoolError),
    #[error("failed to run migration: {0}")]
    Postgres(#[from] PgError),
    #[error("failed to build pool: {0}")]
    PoolBuild(#[from] DbPoolError),
}

struct Migration {
    id: i32,
    description: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        id: 1,
        description: "postings and matches tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS jm.postings (
    hash TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    employer_raw TEXT NOT NULL,
    employer_display TEXT,
    location TEXT NOT NULL,
    description TEXT NOT NULL,
    source_url TEXT NOT NULL,
    origin_source TEXT NOT NULL,
    categories TEXT[] NOT NULL DEFAULT '{}',
    is_internship BOOLEAN NOT NULL DEFAULT FALSE,
    is_graduate_program BOOLEAN NOT NULL DEFAULT FALSE,
    visa_friendly BOOLEAN,
    work_mode TEXT NOT NULL DEFAULT 'unknown',
    active BOOLEAN NOT NULL DEFAULT TRUE,
    filtered_reason TEXT,
    posted_at TIMESTAMPTZ,
    last_seen_at TIMESTAMPTZ NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_postings_active_recency
    ON jm.postings ((COALESCE(posted_at, created_at)) DESC)
    WHERE active;
CREATE INDEX IF NOT EXISTS idx_postings_last_seen
    ON jm.postings (last_seen_at)
    WHERE active;

CREATE TABLE IF NOT EXISTS jm.matches (
    user_key TEXT NOT NULL,
    posting_hash TEXT NOT NULL REFERENCES jm.postings (hash),
    score DOUBLE PRECISION NOT NULL,
    rationale TEXT NOT NULL,
    quality_tier TEXT NOT NULL,
    tags TEXT[] NOT NULL DEFAULT '{}',
    match_run_id TEXT NOT NULL,
    matched_at TIMESTAMPTZ NOT NULL,
    PRIMARY KEY (user_key, posting_hash)
);
"#,
    },
    Migration {
        id: 2,
        description: "safety checks for filtered reasons + score ranges",
        sql: r#"
DO $$
BEGIN
    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'chk_filtered_reason_inactive'
    ) THEN
        ALTER TABLE jm.postings
            ADD CONSTRAINT chk_filtered_reason_inactive
            CHECK (filtered_reason IS NULL OR NOT active);
    END IF;

    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'chk_filtered_reason_values'
    ) THEN
        ALTER TABLE jm.postings
            ADD CONSTRAINT chk_filtered_reason_values
            CHECK (filtered_reason IS NULL OR filtered_reason IN (
                'job_board_as_company', 'executive_role', 'construction_role',
                'medical_role', 'legal_role', 'teaching_role'
            ));
    END IF;

    IF NOT EXISTS (
        SELECT 1 FROM pg_constraint WHERE conname = 'chk_match_score_range'
    ) THEN
        ALTER TABLE jm.matches
            ADD CONSTRAINT chk_match_score_range
            CHECK (score >= 0.0 AND score <= 1.0);
    END IF;
END $$;
"#,
    },
];

#[instrument(skip(pool))]
pub async fn run_migrations(pool: &PgPool) -> Result<(), MigrationError> {
    let mut client = pool.get().await?;
    client
        .batch_execute(
            "CREATE SCHEMA IF NOT EXISTS jm;
             CREATE TABLE IF NOT EXISTS jm.schema_migrations (
                id INTEGER PRIMARY KEY,
                description TEXT NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
             );",
        )
        .await?;

    for migration in MIGRATIONS {
        let already_applied: bool = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM jm.schema_migrations WHERE id = $1)",
                &[&migration.id],
            )
            .await?
            .get(0);

        if already_applied {
            continue;
        }

        let tx = client.transaction().await?;
        tx.batch_execute(migration.sql).await?;
        tx.execute(
            "INSERT INTO jm.schema_migrations (id, description) VALUES ($1, $2)",
            &[&migration.id, &migration.description],
        )
        .await?;
        tx.commit().await?;

        info!(
            id = migration.id,
            description = migration.description,
            "applied migration"
        );
    }

    Ok(())
}
