use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use super::Relaxation;
use crate::corrections::same_city;
use crate::taxonomy::{Category, VisaFriendly};
use crate::{Posting, UserProfile};

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    /// Below this many postings the city constraint is widened.
    pub min_pool_size: usize,
    /// Cap on candidates handed to the scorer (most recent first).
    pub max_candidates: usize,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            min_pool_size: 5,
            max_candidates: 50,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionReport {
    /// Eligible postings in the pool before any user constraint.
    pub eligible: usize,
    pub relaxations: Vec<Relaxation>,
}

#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub candidates: Vec<Posting>,
    pub report: SelectionReport,
}

pub struct CandidateSelector {
    config: SelectorConfig,
}

impl CandidateSelector {
    pub fn new(config: SelectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SelectorConfig {
        &self.config
    }

    /// Narrow the pool by city, career path and visa, in that order.
    ///
    /// City and career path may be relaxed when they over-prune; the visa
    /// constraint never is, but `unknown` always passes it.
    pub fn select(&self, profile: &UserProfile, pool: &[Posting]) -> Selection {
        let eligible: Vec<&Posting> = pool.iter().filter(|p| p.is_eligible()).collect();
        let mut report = SelectionReport {
            eligible: eligible.len(),
            relaxations: Vec::new(),
        };

        let mut narrowed = self.apply_city(profile, &eligible, &mut report);
        narrowed = apply_career_paths(&profile.career_categories(), narrowed, &mut report);

        if profile.requires_visa_sponsorship() {
            narrowed.retain(|p| p.visa_friendly != VisaFriendly::No);
        }

        narrowed.sort_by(|a, b| {
            b.recency_anchor()
                .cmp(&a.recency_anchor())
                .then_with(|| a.hash.cmp(&b.hash))
        });
        narrowed.truncate(self.config.max_candidates);

        for relaxation in &report.relaxations {
            relaxation.record(&profile.user_key);
        }
        debug!(
            user_key = %profile.user_key,
            eligible = report.eligible,
            candidates = narrowed.len(),
            "candidates selected"
        );

        Selection {
            candidates: narrowed.into_iter().cloned().collect(),
            report,
        }
    }

    fn apply_city<'a>(
        &self,
        profile: &UserProfile,
        eligible: &[&'a Posting],
        report: &mut SelectionReport,
    ) -> Vec<&'a Posting> {
        if profile.target_cities().is_empty() {
            return eligible.to_vec();
        }

        let in_city: Vec<&Posting> = eligible
            .iter()
            .copied()
            .filter(|p| in_target_city(profile, p))
            .collect();

        if in_city.len() < self.config.min_pool_size && eligible.len() > in_city.len() {
            report.relaxations.push(Relaxation::CityWidenedToAny);
            return eligible.to_vec();
        }
        in_city
    }
}

impl Default for CandidateSelector {
    fn default() -> Self {
        Self::new(SelectorConfig::default())
    }
}

/// Whether a posting sits in one of the user's target cities. Remote
/// postings count when the user accepts remote work.
pub fn in_target_city(profile: &UserProfile, posting: &Posting) -> bool {
    if posting.is_remote() {
        return profile.accepts_remote();
    }
    match posting.city() {
        Some(city) => profile
            .target_cities()
            .iter()
            .any(|target| same_city(city, target)),
        None => false,
    }
}

fn apply_career_paths<'a>(
    wanted: &BTreeSet<Category>,
    postings: Vec<&'a Posting>,
    report: &mut SelectionReport,
) -> Vec<&'a Posting> {
    if wanted.is_empty() {
        return postings;
    }

    let overlapping: Vec<&Posting> = postings
        .iter()
        .copied()
        .filter(|p| !p.categories.is_disjoint(wanted))
        .collect();

    if overlapping.is_empty() && !postings.is_empty() {
        report.relaxations.push(Relaxation::CareerPathDropped);
        return postings;
    }
    overlapping
}
