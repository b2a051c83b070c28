use std::collections::HashMap;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use metrics::counter;
use serde::Serialize;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::Posting;
use crate::db::{PostingStore, StoreError, UpsertOutcome};

#[derive(Debug, Clone)]
pub struct UpsertConfig {
    pub chunk_size: usize,
    /// Concurrent writes inside one chunk.
    pub concurrency: usize,
    /// Pause between chunks; the only backpressure against downstream rate limits.
    pub inter_chunk_delay: Duration,
    pub write_timeout: Duration,
}

impl Default for UpsertConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            concurrency: 8,
            inter_chunk_delay: Duration::ZERO,
            write_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteError {
    pub hash: String,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub inserted: usize,
    pub updated: usize,
    /// Input records folded into another record with the same hash.
    pub collapsed: usize,
    pub errors: Vec<WriteError>,
}

/// Merge records sharing a hash so one key is never written concurrently.
/// First-seen order is kept.
pub fn collapse_duplicates(postings: Vec<Posting>) -> (Vec<Posting>, usize) {
    let mut index: HashMap<String, usize> = HashMap::with_capacity(postings.len());
    let mut unique: Vec<Posting> = Vec::with_capacity(postings.len());
    let mut collapsed = 0;

    for posting in postings {
        match index.get(&posting.hash) {
            Some(&at) => {
                unique[at].merge_from(&posting);
                collapsed += 1;
            }
            None => {
                index.insert(posting.hash.clone(), unique.len());
                unique.push(posting);
            }
        }
    }

    (unique, collapsed)
}

/// Write postings in chunks with bounded parallelism inside each chunk.
///
/// A failing or timed-out record is reported in [`BatchReport::errors`];
/// the rest of the batch is still written.
pub async fn upsert_postings<S: PostingStore>(
    store: &S,
    postings: Vec<Posting>,
    config: &UpsertConfig,
) -> BatchReport {
    let (postings, collapsed) = collapse_duplicates(postings);
    let mut report = BatchReport {
        collapsed,
        ..BatchReport::default()
    };

    let chunk_size = config.chunk_size.max(1);
    let concurrency = config.concurrency.max(1);
    let chunk_count = postings.len().div_ceil(chunk_size);

    for (chunk_index, chunk) in postings.chunks(chunk_size).enumerate() {
        if chunk_index > 0 && !config.inter_chunk_delay.is_zero() {
            sleep(config.inter_chunk_delay).await;
        }

        let results: Vec<(&str, Result<UpsertOutcome, StoreError>)> = stream::iter(chunk)
            .map(|posting| async move {
                let result = match timeout(config.write_timeout, store.upsert_posting(posting)).await {
                    Ok(result) => result,
                    Err(_) => Err(StoreError::Timeout(config.write_timeout)),
                };
                (posting.hash.as_str(), result)
            })
            .buffer_unordered(concurrency)
            .collect()
            .await;

        for (hash, result) in results {
            match result {
                Ok(outcome) => {
                    counter!("jm_postings_upserted_total", "outcome" => outcome.as_str()).increment(1);
                    match outcome {
                        UpsertOutcome::Inserted => report.inserted += 1,
                        UpsertOutcome::Updated => report.updated += 1,
                    }
                }
                Err(err) => {
                    counter!("jm_posting_write_errors_total").increment(1);
                    warn!(hash, error = %err, "posting write failed");
                    report.errors.push(WriteError {
                        hash: hash.to_string(),
                        message: err.to_string(),
                    });
                }
            }
        }

        debug!(
            chunk = chunk_index + 1,
            chunks = chunk_count,
            size = chunk.len(),
            "posting chunk written"
        );
    }

    info!(
        inserted = report.inserted,
        updated = report.updated,
        collapsed = report.collapsed,
        errors = report.errors.len(),
        "posting batch upserted"
    );
    report
}
