use serde::{Deserialize, Serialize};

use crate::matching::ScoredCandidate;
use crate::taxonomy::QualityTier;
use crate::{Posting, UserProfile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Matched,
    /// Nothing survived selection even after relaxation.
    NoEligiblePostings,
}

impl MatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchStatus::Matched => "matched",
            MatchStatus::NoEligiblePostings => "no_eligible_postings",
        }
    }
}

/// One posting as handed to the notification collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationItem {
    pub title: String,
    /// Display name when one survived classification, raw name otherwise.
    pub employer: String,
    pub location: String,
    pub url: String,
    pub rationale: String,
    /// In `[0, 1]`.
    pub score: f64,
    pub quality_tier: QualityTier,
}

impl NotificationItem {
    fn from_pick(posting: &Posting, score: f64, rationale: &str) -> Self {
        Self {
            title: posting.title.clone(),
            employer: posting.employer_name().to_string(),
            location: posting.location.clone(),
            url: posting.source_url.clone(),
            rationale: rationale.to_string(),
            score,
            quality_tier: QualityTier::from_score(score),
        }
    }
}

/// Finalized, ordered list for one user. Delivery cadence and dedup
/// against earlier sends belong to the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPayload {
    pub user_key: String,
    pub email: Option<String>,
    pub status: MatchStatus,
    pub items: Vec<NotificationItem>,
}

impl NotificationPayload {
    pub fn matched(profile: &UserProfile, picks: &[ScoredCandidate]) -> Self {
        Self {
            user_key: profile.user_key.clone(),
            email: profile.email.clone(),
            status: MatchStatus::Matched,
            items: picks
                .iter()
                .map(|pick| NotificationItem::from_pick(&pick.posting, pick.score, &pick.rationale))
                .collect(),
        }
    }

    /// Explicit empty signal, distinct from a matched list that happens to
    /// be short.
    pub fn no_eligible_postings(profile: &UserProfile) -> Self {
        Self {
            user_key: profile.user_key.clone(),
            email: profile.email.clone(),
            status: MatchStatus::NoEligiblePostings,
            items: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::posting;

    #[test]
    fn payload_serializes_in_camel_case() {
        let mut pick = posting("Graduate Analyst", "Acme Holdings Ltd", "London, GB");
        pick.employer_display = Some("Acme".into());
        let profile = UserProfile {
            user_key: "user-1".into(),
            email: Some("ada@example.com".into()),
            ..UserProfile::default()
        };

        let payload = NotificationPayload::matched(
            &profile,
            &[ScoredCandidate {
                posting: pick,
                score: 0.86,
                rationale: "Strong fit".into(),
            }],
        );
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["userKey"], "user-1");
        assert_eq!(json["status"], "matched");
        assert_eq!(json["items"][0]["employer"], "Acme");
        assert_eq!(json["items"][0]["qualityTier"], "excellent");
        assert_eq!(json["items"][0]["rationale"], "Strong fit");
    }

    #[test]
    fn empty_pool_is_an_explicit_status() {
        let profile = UserProfile {
            user_key: "user-2".into(),
            ..UserProfile::default()
        };

        let payload = NotificationPayload::no_eligible_postings(&profile);
        let json = serde_json::to_value(&payload).unwrap();

        assert_eq!(json["status"], "no_eligible_postings");
        assert_eq!(json["items"].as_array().map(Vec::len), Some(0));
    }
}
