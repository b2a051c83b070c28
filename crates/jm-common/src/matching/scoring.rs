use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::prefilter::in_target_city;
use super::weights::{
    FALLBACK_SCORE_CEILING, FALLBACK_SCORE_FLOOR, FALLBACK_WEIGHTS, RECENCY_HORIZON_DAYS,
};
use crate::{Posting, UserProfile};

/// A candidate annotated with a relevance score in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCandidate {
    pub posting: Posting,
    pub score: f64,
    pub rationale: String,
}

/// Descending score; ties go to the more recent posting, then the hash, so
/// repeated runs order identically.
pub fn sort_scored(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.posting.recency_anchor().cmp(&a.posting.recency_anchor()))
            .then_with(|| a.posting.hash.cmp(&b.posting.hash))
    });
}

/// Linear decay from 1.0 (posted now) to 0.0 at the recency horizon.
fn recency_signal(posting: &Posting, now: DateTime<Utc>) -> f64 {
    let age_hours = (now - posting.recency_anchor()).num_hours().max(0) as f64;
    let horizon_hours = (RECENCY_HORIZON_DAYS * 24) as f64;
    (1.0 - age_hours / horizon_hours).clamp(0.0, 1.0)
}

/// Deterministic score from career-path overlap, city and recency.
pub fn rule_based_score(
    profile: &UserProfile,
    posting: &Posting,
    now: DateTime<Utc>,
) -> ScoredCandidate {
    let wanted = profile.career_categories();
    let shared: Vec<&'static str> = posting
        .categories
        .iter()
        .filter(|c| wanted.contains(*c))
        .map(|c| c.label())
        .collect();

    let career = if shared.is_empty() { 0.0 } else { 1.0 };
    let city = if in_target_city(profile, posting) { 1.0 } else { 0.0 };
    let recency = recency_signal(posting, now);

    let raw = FALLBACK_WEIGHTS.career * career
        + FALLBACK_WEIGHTS.city * city
        + FALLBACK_WEIGHTS.recency * recency;
    let score = FALLBACK_SCORE_FLOOR + (FALLBACK_SCORE_CEILING - FALLBACK_SCORE_FLOOR) * raw;

    let mut reasons = Vec::new();
    if !shared.is_empty() {
        reasons.push(format!("matches your {} interest", shared.join(" / ")));
    }
    if city > 0.0 {
        if posting.is_remote() {
            reasons.push("remote".to_string());
        } else {
            reasons.push(format!("based in {}", posting.city().unwrap_or(posting.location.as_str())));
        }
    }
    let age_days = (now - posting.recency_anchor()).num_days().max(0);
    if age_days < RECENCY_HORIZON_DAYS {
        reasons.push(format!("posted {age_days} day(s) ago"));
    }
    let rationale = if reasons.is_empty() {
        "Closest available opening for your preferences".to_string()
    } else {
        let mut text = reasons.join(", ");
        if let Some(first) = text.get(..1) {
            text = first.to_uppercase() + &text[1..];
        }
        text
    };

    ScoredCandidate {
        posting: posting.clone(),
        score,
        rationale,
    }
}

/// Score every candidate with the rule-based scorer, best first.
pub fn score_by_rules(
    profile: &UserProfile,
    candidates: &[Posting],
    now: DateTime<Utc>,
) -> Vec<ScoredCandidate> {
    let mut scored: Vec<ScoredCandidate> = candidates
        .iter()
        .map(|posting| rule_based_score(profile, posting, now))
        .collect();
    sort_scored(&mut scored);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::Category;
    use crate::test_support::{fixed_now, posting};

    fn user() -> UserProfile {
        UserProfile {
            user_key: "user-1".into(),
            target_cities: vec!["London".into()],
            career_paths: vec!["Data & Analytics".into()],
            ..UserProfile::default()
        }
    }

    #[test]
    fn scores_stay_inside_the_fallback_band() {
        let now = fixed_now();
        let mut best = posting("Data Analyst", "Acme", "London, GB");
        best.categories.insert(Category::DataAnalytics);
        best.posted_at = Some(now);
        let mut worst = posting("Sales Associate", "Acme", "Paris, FR");
        worst.posted_at = Some(now - chrono::Duration::days(90));

        let high = rule_based_score(&user(), &best, now);
        let low = rule_based_score(&user(), &worst, now);

        assert!((high.score - FALLBACK_SCORE_CEILING).abs() < 1e-9);
        assert!((low.score - FALLBACK_SCORE_FLOOR).abs() < 1e-9);
        assert!(high.rationale.contains("Data & Analytics"));
        assert!(high.rationale.contains("London"));
    }

    #[test]
    fn recency_decays_linearly_over_thirty_days() {
        let now = fixed_now();
        let mut p = posting("Sales Associate", "Acme", "Paris, FR");
        p.posted_at = Some(now - chrono::Duration::days(15));

        let scored = rule_based_score(&user(), &p, now);
        let expected = FALLBACK_SCORE_FLOOR
            + (FALLBACK_SCORE_CEILING - FALLBACK_SCORE_FLOOR) * FALLBACK_WEIGHTS.recency * 0.5;
        assert!((scored.score - expected).abs() < 1e-9, "{}", scored.score);
    }

    #[test]
    fn output_is_sorted_best_first() {
        let now = fixed_now();
        let mut london = posting("Analyst", "Acme", "London, GB");
        london.categories.insert(Category::DataAnalytics);
        let paris = posting("Analyst", "Acme", "Paris, FR");

        let scored = score_by_rules(&user(), &[paris.clone(), london.clone()], now);

        assert_eq!(scored[0].posting.hash, london.hash);
        assert_eq!(scored[1].posting.hash, paris.hash);
        assert!(scored[0].score > scored[1].score);
    }
}
