//! Ingest orchestration: canonicalize → classify → upsert, plus pool
//! maintenance (reclassification and staleness).

pub mod writer;

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Duration, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::canonicalize::{RecordRejection, canonicalize_batch};
use crate::db::{PostingStore, StoreError};
use crate::eligibility::{ClassificationReport, classify_pool};
use crate::run_id;

pub use writer::{BatchReport, UpsertConfig, WriteError, collapse_duplicates, upsert_postings};

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub run_id: String,
    pub received: usize,
    pub accepted: usize,
    pub rejected: Vec<RecordRejection>,
    /// Postings deactivated by an eligibility rule, per reason.
    pub filtered: BTreeMap<&'static str, usize>,
    pub inserted: usize,
    pub updated: usize,
    pub collapsed: usize,
    pub write_errors: Vec<WriteError>,
}

/// Run one batch of raw source records through the ingest pipeline.
///
/// Validation failures and per-record write failures are reported, never
/// raised; the batch always runs to the end.
#[instrument(skip_all, fields(run_id = run_id::get(), received = records.len()))]
pub async fn ingest_raw_postings<S: PostingStore>(
    records: Vec<serde_json::Value>,
    store: &S,
    config: &UpsertConfig,
    seen_at: DateTime<Utc>,
) -> IngestReport {
    let received = records.len();
    let batch = canonicalize_batch(records, seen_at);
    let mut postings = batch.postings;

    let classification = classify_pool(&mut postings);
    let filtered = classification.filtered_counts();
    for (reason, count) in &filtered {
        counter!("jm_postings_filtered_total", "reason" => *reason).increment(*count as u64);
    }

    let accepted = postings.len();
    let written = upsert_postings(store, postings, config).await;

    let report = IngestReport {
        run_id: run_id::get().to_string(),
        received,
        accepted,
        rejected: batch.rejected,
        filtered,
        inserted: written.inserted,
        updated: written.updated,
        collapsed: written.collapsed,
        write_errors: written.errors,
    };

    info!(
        accepted = report.accepted,
        rejected = report.rejected.len(),
        filtered = report.filtered.values().sum::<usize>(),
        inserted = report.inserted,
        updated = report.updated,
        write_errors = report.write_errors.len(),
        "ingest batch finished"
    );
    report
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReclassifyReport {
    pub classification: ClassificationReport,
    pub saved: usize,
    pub write_errors: Vec<WriteError>,
}

/// Classifier pass over the persisted active pool. Only changed postings
/// are written back, and `last_seen_at` is left alone.
#[instrument(skip_all, fields(run_id = run_id::get()))]
pub async fn reclassify_pool<S: PostingStore>(store: &S) -> Result<ReclassifyReport, StoreError> {
    let mut pool = store.load_active_pool().await?;
    let classification = classify_pool(&mut pool);

    let changed: HashSet<String> = classification.changed_hashes().map(str::to_string).collect();

    let mut report = ReclassifyReport::default();
    for posting in pool.iter().filter(|p| changed.contains(p.hash.as_str())) {
        match store.save_classification(posting).await {
            Ok(()) => report.saved += 1,
            Err(err) => {
                warn!(hash = %posting.hash, error = %err, "classification write failed");
                report.write_errors.push(WriteError {
                    hash: posting.hash.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    for (reason, count) in classification.filtered_counts() {
        counter!("jm_postings_filtered_total", "reason" => reason).increment(count as u64);
    }
    info!(
        examined = classification.examined,
        changed = classification.postings.len(),
        saved = report.saved,
        "pool reclassified"
    );
    report.classification = classification;
    Ok(report)
}

/// Deactivate postings not seen for longer than `max_age`.
#[instrument(skip(store), fields(run_id = run_id::get()))]
pub async fn deactivate_stale<S: PostingStore>(
    store: &S,
    max_age: Duration,
    now: DateTime<Utc>,
) -> Result<u64, StoreError> {
    let cutoff = now - max_age;
    let affected = store.deactivate_stale(cutoff).await?;
    info!(%cutoff, affected, "stale postings deactivated");
    Ok(affected)
}
