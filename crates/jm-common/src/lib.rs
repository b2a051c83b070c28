pub mod api;
pub mod canonicalize;
pub mod corrections;
pub mod db;
pub mod eligibility;
pub mod ingest;
pub mod logging;
pub mod matching;
pub mod normalize;
pub mod run_id;
pub mod taxonomy;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use taxonomy::{
    Category, EntryLevelPreference, FilteredReason, QualityTier, VisaFriendly, VisaStatus,
    WorkEnvironment, WorkMode,
};

/// Location marker for postings without a fixed city.
pub const REMOTE_LOCATION: &str = "remote";

// Core data models shared by ingest and matching.

/// One normalized job opening, keyed by its content hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Posting {
    pub hash: String,
    pub title: String,
    pub employer_raw: String,
    /// Cleared when the employer turns out to be a job board.
    pub employer_display: Option<String>,
    /// `City, CC`, `City`, or [`REMOTE_LOCATION`].
    pub location: String,
    pub description: String,
    pub source_url: String,
    pub origin_source: String,
    pub categories: BTreeSet<Category>,
    pub is_internship: bool,
    pub is_graduate_program: bool,
    pub visa_friendly: VisaFriendly,
    pub work_mode: WorkMode,
    pub active: bool,
    /// Set iff the posting was deactivated by a hard-eligibility rule.
    /// Staleness deactivation leaves it empty.
    pub filtered_reason: Option<FilteredReason>,
    pub posted_at: Option<DateTime<Utc>>,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostingStatus {
    Active,
    Inactive,
}

impl PostingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostingStatus::Active => "active",
            PostingStatus::Inactive => "inactive",
        }
    }
}

impl Posting {
    pub fn status(&self) -> PostingStatus {
        if self.active {
            PostingStatus::Active
        } else {
            PostingStatus::Inactive
        }
    }

    /// Active and not flagged by any eligibility rule.
    pub fn is_eligible(&self) -> bool {
        self.active && self.filtered_reason.is_none()
    }

    pub fn is_remote(&self) -> bool {
        self.location == REMOTE_LOCATION
    }

    /// City part of the normalized location (`None` for remote postings).
    pub fn city(&self) -> Option<&str> {
        if self.is_remote() || self.location.is_empty() {
            return None;
        }
        self.location.split(", ").next()
    }

    pub fn is_early_career(&self) -> bool {
        self.is_internship
            || self.is_graduate_program
            || self.categories.contains(&Category::EarlyCareer)
    }

    pub fn has_specific_category(&self) -> bool {
        self.categories.iter().any(Category::is_specific)
    }

    /// Employer name for display: the cleaned display name when present.
    pub fn employer_name(&self) -> &str {
        self.employer_display.as_deref().unwrap_or(&self.employer_raw)
    }

    /// Timestamp recency is measured from.
    pub fn recency_anchor(&self) -> DateTime<Utc> {
        self.posted_at.unwrap_or(self.created_at)
    }

    pub fn deactivate(&mut self, reason: FilteredReason) {
        self.active = false;
        self.filtered_reason = Some(reason);
    }

    /// Merge a re-scraped copy of the same opening into the stored row.
    ///
    /// The incoming classification wins for `active`/`filtered_reason`/
    /// `employer_display`; categories only grow; a definite visa value is
    /// never replaced by `Unknown`; `created_at` is kept.
    pub fn merge_from(&mut self, incoming: &Posting) {
        debug_assert_eq!(self.hash, incoming.hash);

        self.title = incoming.title.clone();
        self.employer_raw = incoming.employer_raw.clone();
        self.employer_display = incoming.employer_display.clone();
        self.location = incoming.location.clone();
        self.description = incoming.description.clone();
        self.source_url = incoming.source_url.clone();
        self.origin_source = incoming.origin_source.clone();
        self.categories.extend(incoming.categories.iter().copied());
        self.is_internship = incoming.is_internship;
        self.is_graduate_program = incoming.is_graduate_program;
        if incoming.visa_friendly.is_definite() {
            self.visa_friendly = incoming.visa_friendly;
        }
        if incoming.work_mode != WorkMode::Unknown {
            self.work_mode = incoming.work_mode;
        }
        self.active = incoming.active;
        self.filtered_reason = incoming.filtered_reason;
        self.posted_at = incoming.posted_at.or(self.posted_at);
        self.last_seen_at = self.last_seen_at.max(incoming.last_seen_at);
    }
}

/// A consumer's preferences for one matching run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub user_key: String,
    pub email: Option<String>,
    /// Ordered by preference; only the first [`UserProfile::MAX_TARGET_CITIES`] count.
    pub target_cities: Vec<String>,
    pub languages: Vec<String>,
    pub career_paths: Vec<String>,
    pub entry_level_preferences: Vec<EntryLevelPreference>,
    pub work_environments: Vec<WorkEnvironment>,
    pub visa_status: VisaStatus,
    pub employer_types: Vec<String>,
    pub roles: Vec<String>,
}

impl UserProfile {
    pub const MAX_TARGET_CITIES: usize = 3;

    pub fn target_cities(&self) -> &[String] {
        let len = self.target_cities.len().min(Self::MAX_TARGET_CITIES);
        &self.target_cities[..len]
    }

    /// Categories the user's career paths map onto. Unknown tags are skipped.
    pub fn career_categories(&self) -> BTreeSet<Category> {
        self.career_paths
            .iter()
            .filter_map(|tag| Category::from_career_path(tag))
            .collect()
    }

    pub fn requires_visa_sponsorship(&self) -> bool {
        self.visa_status == VisaStatus::NeedsSponsorship
    }

    pub fn accepts_remote(&self) -> bool {
        self.work_environments.contains(&WorkEnvironment::Remote)
    }
}

/// Final match row, keyed by `(user_key, posting_hash)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub user_key: String,
    pub posting_hash: String,
    pub score: f64,
    pub rationale: String,
    pub quality_tier: QualityTier,
    pub tags: Vec<String>,
    pub match_run_id: String,
    pub matched_at: DateTime<Utc>,
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn city_is_taken_from_normalized_location() {
        assert_eq!(posting("A", "B", "London, GB").city(), Some("London"));
        assert_eq!(posting("A", "B", "Lyon").city(), Some("Lyon"));
        assert_eq!(posting("A", "B", REMOTE_LOCATION).city(), None);
    }

    #[test]
    fn merge_keeps_definite_visa_and_grows_categories() {
        let mut stored = posting("Graduate Analyst", "Acme", "London, GB");
        stored.visa_friendly = VisaFriendly::Yes;
        stored.categories.insert(Category::DataAnalytics);

        let mut incoming = stored.clone();
        incoming.visa_friendly = VisaFriendly::Unknown;
        incoming.categories = BTreeSet::from([Category::FinanceInvestment]);
        incoming.last_seen_at = stored.last_seen_at + chrono::Duration::days(1);
        incoming.created_at = stored.created_at + chrono::Duration::days(1);

        let created = stored.created_at;
        stored.merge_from(&incoming);

        assert_eq!(stored.visa_friendly, VisaFriendly::Yes);
        assert!(stored.categories.contains(&Category::DataAnalytics));
        assert!(stored.categories.contains(&Category::FinanceInvestment));
        assert_eq!(stored.last_seen_at, incoming.last_seen_at);
        assert_eq!(stored.created_at, created);
    }

    #[test]
    fn profile_caps_target_cities() {
        let profile = UserProfile {
            target_cities: vec!["London".into(), "Paris".into(), "Berlin".into(), "Rome".into()],
            ..UserProfile::default()
        };
        assert_eq!(profile.target_cities().len(), 3);
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"userKey":"u-1","careerPaths":["Data & Analytics"],"visaStatus":"needs_sponsorship","workEnvironments":["remote","on_site"]}"#,
        )
        .unwrap();

        assert_eq!(profile.user_key, "u-1");
        assert!(profile.requires_visa_sponsorship());
        assert!(profile.accepts_remote());
        assert_eq!(
            profile.career_categories(),
            BTreeSet::from([Category::DataAnalytics])
        );
        assert!(profile.target_cities.is_empty());
    }
}
