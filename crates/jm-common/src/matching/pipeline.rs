use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

use super::Relaxation;
use super::ai::{ScoringBackend, ScoringErrorKind, ScoringMethod, score_with_fallback};
use super::distributor::{DistributorConfig, DiversityDistributor};
use super::prefilter::{CandidateSelector, SelectorConfig};
use super::writer::{MatchTags, build_matches, write_matches};
use crate::api::{MatchStatus, NotificationPayload};
use crate::db::{MatchStore, PostingStore, StoreError};
use crate::ingest::WriteError;
use crate::{Match, Posting, UserProfile, run_id};

#[derive(Debug, Clone)]
pub struct MatchingConfig {
    /// Users matched concurrently; each user's own stages run sequentially.
    pub user_concurrency: usize,
    pub selector: SelectorConfig,
    pub distributor: DistributorConfig,
    pub scoring_timeout: Duration,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            user_concurrency: 4,
            selector: SelectorConfig::default(),
            distributor: DistributorConfig::default(),
            scoring_timeout: Duration::from_secs(30),
        }
    }
}

/// Run-fatal failures. Everything scoped to one posting or one user is
/// reported in the outcome instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("posting pool unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMatchOutcome {
    pub user_key: String,
    pub status: MatchStatus,
    /// Rows actually persisted, best first.
    pub matches: Vec<Match>,
    pub relaxations: Vec<Relaxation>,
    pub scoring_method: Option<ScoringMethod>,
    pub scoring_error: Option<ScoringErrorKind>,
    pub write_errors: Vec<WriteError>,
    pub notification: NotificationPayload,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub pool_size: usize,
    pub users: usize,
    pub matched: usize,
    pub no_eligible_postings: usize,
    pub fallback_used: usize,
    pub matches_written: usize,
    pub write_errors: usize,
}

#[derive(Debug, Clone, Default)]
pub struct MatchRun {
    pub summary: RunSummary,
    /// In input profile order.
    pub outcomes: Vec<UserMatchOutcome>,
}

pub struct MatchingEngine<B> {
    config: MatchingConfig,
    selector: CandidateSelector,
    distributor: DiversityDistributor,
    backend: B,
}

impl<B: ScoringBackend> MatchingEngine<B> {
    pub fn new(config: MatchingConfig, backend: B) -> Self {
        Self {
            selector: CandidateSelector::new(config.selector.clone()),
            distributor: DiversityDistributor::new(config.distributor.clone()),
            config,
            backend,
        }
    }

    pub fn config(&self) -> &MatchingConfig {
        &self.config
    }

    /// Selector → scorer → distributor → writer for one user.
    #[instrument(skip_all, fields(run_id = run_id::get(), user_key = %profile.user_key))]
    pub async fn match_user<S: MatchStore>(
        &self,
        store: &S,
        profile: &UserProfile,
        pool: &[Posting],
        now: DateTime<Utc>,
    ) -> UserMatchOutcome {
        let selection = self.selector.select(profile, pool);
        let mut relaxations = selection.report.relaxations.clone();

        if selection.candidates.is_empty() {
            info!(eligible = selection.report.eligible, "no eligible postings for user");
            return UserMatchOutcome {
                user_key: profile.user_key.clone(),
                status: MatchStatus::NoEligiblePostings,
                matches: Vec::new(),
                relaxations,
                scoring_method: None,
                scoring_error: None,
                write_errors: Vec::new(),
                notification: NotificationPayload::no_eligible_postings(profile),
            };
        }

        let scoring = score_with_fallback(
            &self.backend,
            self.config.scoring_timeout,
            profile,
            &selection.candidates,
            now,
        )
        .await;
        let method = scoring.method();
        let scoring_error = scoring.error_kind();
        let rule_filled = scoring.rule_filled();

        let distribution = self
            .distributor
            .distribute(scoring.into_scored(), profile.target_cities());
        for relaxation in &distribution.relaxations {
            relaxation.record(&profile.user_key);
        }
        relaxations.extend(distribution.relaxations.iter().copied());

        let tags = MatchTags {
            method,
            rule_filled,
            relaxations: relaxations.clone(),
            quality_gate: self.config.distributor.quality_gate,
        };
        let rows = build_matches(&profile.user_key, &distribution, &tags, now);
        let written = write_matches(store, rows).await;

        info!(
            candidates = selection.candidates.len(),
            selected = distribution.selected.len(),
            method = method.as_str(),
            relaxations = relaxations.len(),
            "user matched"
        );

        UserMatchOutcome {
            user_key: profile.user_key.clone(),
            status: MatchStatus::Matched,
            matches: written.written,
            relaxations,
            scoring_method: Some(method),
            scoring_error,
            write_errors: written.errors,
            notification: NotificationPayload::matched(profile, &distribution.selected),
        }
    }

    /// Load the eligible pool once, then match users with bounded
    /// concurrency. Only an unreachable posting pool fails the run.
    #[instrument(skip_all, fields(run_id = run_id::get(), users = profiles.len()))]
    pub async fn run_matching<S: PostingStore + MatchStore>(
        &self,
        store: &S,
        profiles: &[UserProfile],
        now: DateTime<Utc>,
    ) -> Result<MatchRun, PipelineError> {
        let pool: Vec<Posting> = store
            .load_active_pool()
            .await?
            .into_iter()
            .filter(Posting::is_eligible)
            .collect();
        let pool_ref = pool.as_slice();

        let mut indexed: Vec<(usize, UserMatchOutcome)> = stream::iter(profiles.iter().enumerate())
            .map(|(index, profile)| async move {
                (index, self.match_user(store, profile, pool_ref, now).await)
            })
            .buffer_unordered(self.config.user_concurrency.max(1))
            .collect()
            .await;
        indexed.sort_by_key(|(index, _)| *index);
        let outcomes: Vec<UserMatchOutcome> = indexed.into_iter().map(|(_, o)| o).collect();

        let mut summary = RunSummary {
            run_id: run_id::get().to_string(),
            pool_size: pool.len(),
            users: outcomes.len(),
            ..RunSummary::default()
        };
        for outcome in &outcomes {
            match outcome.status {
                MatchStatus::Matched => summary.matched += 1,
                MatchStatus::NoEligiblePostings => summary.no_eligible_postings += 1,
            }
            if outcome.scoring_method == Some(ScoringMethod::RuleBased) {
                summary.fallback_used += 1;
            }
            summary.matches_written += outcome.matches.len();
            summary.write_errors += outcome.write_errors.len();
        }

        info!(
            pool_size = summary.pool_size,
            matched = summary.matched,
            no_eligible_postings = summary.no_eligible_postings,
            fallback_used = summary.fallback_used,
            matches_written = summary.matches_written,
            write_errors = summary.write_errors,
            "matching run finished"
        );
        Ok(MatchRun { summary, outcomes })
    }
}
