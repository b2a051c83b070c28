//! Per-user matching: candidate selection, scoring, diversity
//! distribution and match persistence.

pub mod ai;
pub mod distributor;
pub mod pipeline;
pub mod prefilter;
pub mod scoring;
pub mod weights;
pub mod writer;

use metrics::counter;
use serde::Serialize;
use tracing::info;

pub use ai::{
    HttpScoringBackend, LlmRuntimeConfig, ScoringBackend, ScoringError, ScoringErrorKind,
    ScoringMethod, ScoringOutcome, normalize_score, parse_reply, score_with_fallback,
};
pub use distributor::{DistributorConfig, Distribution, DiversityDistributor, SourceKey};
pub use pipeline::{
    MatchRun, MatchingConfig, MatchingEngine, PipelineError, RunSummary, UserMatchOutcome,
};
pub use prefilter::{CandidateSelector, Selection, SelectionReport, SelectorConfig};
pub use scoring::{ScoredCandidate, rule_based_score, score_by_rules, sort_scored};
pub use writer::{MatchTags, MatchWriteReport, build_matches, write_matches};

/// A constraint loosened so a user still gets a usable list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Relaxation {
    CityWidenedToAny,
    CareerPathDropped,
    QualityGateDropped,
    CityBalanceRelaxed,
    SourceCapRelaxed,
}

impl Relaxation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Relaxation::CityWidenedToAny => "city_widened_to_any",
            Relaxation::CareerPathDropped => "career_path_dropped",
            Relaxation::QualityGateDropped => "quality_gate_dropped",
            Relaxation::CityBalanceRelaxed => "city_balance_relaxed",
            Relaxation::SourceCapRelaxed => "source_cap_relaxed",
        }
    }

    pub(crate) fn record(self, user_key: &str) {
        info!(user_key, relaxation = self.as_str(), "constraint relaxed");
        counter!("jm_relaxations_total", "kind" => self.as_str()).increment(1);
    }
}
