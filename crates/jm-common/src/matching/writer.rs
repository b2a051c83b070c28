use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tracing::{info, warn};

use super::Relaxation;
use super::ai::ScoringMethod;
use super::distributor::Distribution;
use crate::db::MatchStore;
use crate::ingest::WriteError;
use crate::taxonomy::QualityTier;
use crate::{Match, run_id};

/// Per-user context that ends up as tags on every match row.
#[derive(Debug, Clone)]
pub struct MatchTags {
    pub method: ScoringMethod,
    /// Scored by rules although the user's AI call succeeded.
    pub rule_filled: BTreeSet<String>,
    pub relaxations: Vec<Relaxation>,
    pub quality_gate: f64,
}

impl MatchTags {
    fn for_pick(&self, hash: &str, score: f64, distribution: &Distribution) -> Vec<String> {
        let rule_scored =
            self.method == ScoringMethod::RuleBased || self.rule_filled.contains(hash);
        let mut tags = vec![if rule_scored {
            "fallback_scored".to_string()
        } else {
            "ai_scored".to_string()
        }];
        if self.relaxations.contains(&Relaxation::CityWidenedToAny) {
            tags.push("relaxed_city".into());
        }
        if self.relaxations.contains(&Relaxation::CareerPathDropped) {
            tags.push("relaxed_career_path".into());
        }
        if self.relaxations.contains(&Relaxation::QualityGateDropped) && score < self.quality_gate {
            tags.push("quality_gate_dropped".into());
        }
        if distribution.relaxed_hashes.contains(hash) {
            tags.push("diversity_relaxed".into());
        }
        tags
    }
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchWriteReport {
    pub written: Vec<Match>,
    pub errors: Vec<WriteError>,
}

/// Turn one user's distributed picks into match rows, best first.
pub fn build_matches(
    user_key: &str,
    distribution: &Distribution,
    tags: &MatchTags,
    matched_at: DateTime<Utc>,
) -> Vec<Match> {
    distribution
        .selected
        .iter()
        .map(|pick| Match {
            user_key: user_key.to_string(),
            posting_hash: pick.posting.hash.clone(),
            score: pick.score,
            rationale: pick.rationale.clone(),
            quality_tier: QualityTier::from_score(pick.score),
            tags: tags.for_pick(&pick.posting.hash, pick.score, distribution),
            match_run_id: run_id::get().to_string(),
            matched_at,
        })
        .collect()
}

/// Upsert match rows one by one. A failing row is reported and the rest
/// are still written.
pub async fn write_matches<S: MatchStore>(store: &S, matches: Vec<Match>) -> MatchWriteReport {
    let mut report = MatchWriteReport::default();

    for record in matches {
        match store.upsert_match(&record).await {
            Ok(()) => {
                counter!("jm_matches_written_total").increment(1);
                report.written.push(record);
            }
            Err(err) => {
                warn!(
                    user_key = %record.user_key,
                    hash = %record.posting_hash,
                    error = %err,
                    "match write failed"
                );
                report.errors.push(WriteError {
                    hash: record.posting_hash,
                    message: err.to_string(),
                });
            }
        }
    }

    if let Some(first) = report.written.first() {
        info!(
            user_key = %first.user_key,
            written = report.written.len(),
            errors = report.errors.len(),
            "matches written"
        );
    }
    report
}
