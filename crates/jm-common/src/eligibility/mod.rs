//! Eligibility classifier.
//!
//! Runs over active postings in a fixed order: hard-eligibility rules
//! (job boards, out-of-scope professions), then category backfill, then visa
//! backfill. A posting deactivated by a rule gets no backfill. Every step
//! only acts when it would change something, so a second pass over the same
//! pool reports nothing.

pub mod categories;
pub mod rules;
pub mod visa;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::Posting;
use crate::taxonomy::{Category, FilteredReason, VisaFriendly};

pub use rules::{EligibilityRule, RULES, RuleInput, first_hit};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassificationChange {
    Deactivated {
        reason: FilteredReason,
        rule: &'static str,
    },
    CategoriesAdded {
        categories: Vec<Category>,
    },
    VisaSet {
        value: VisaFriendly,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PostingChanges {
    pub hash: String,
    pub changes: Vec<ClassificationChange>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationReport {
    pub examined: usize,
    pub postings: Vec<PostingChanges>,
}

impl ClassificationReport {
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    pub fn changed_hashes(&self) -> impl Iterator<Item = &str> {
        self.postings.iter().map(|p| p.hash.as_str())
    }

    /// Deactivations per filtered reason.
    pub fn filtered_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for posting in &self.postings {
            for change in &posting.changes {
                if let ClassificationChange::Deactivated { reason, .. } = change {
                    *counts.entry(reason.as_str()).or_insert(0) += 1;
                }
            }
        }
        counts
    }
}

/// Classify one posting in place and return what changed.
pub fn classify(posting: &mut Posting) -> Vec<ClassificationChange> {
    let mut changes = Vec::new();
    if !posting.active {
        return changes;
    }

    let input = RuleInput::from_posting(posting);
    if let Some(rule) = first_hit(&input) {
        posting.deactivate(rule.effect.reason);
        if rule.effect.clear_employer_display {
            posting.employer_display = None;
        }
        changes.push(ClassificationChange::Deactivated {
            reason: rule.effect.reason,
            rule: rule.name,
        });
        return changes;
    }

    let added = categories::backfill(posting);
    if !added.is_empty() {
        posting.categories.extend(added.iter().copied());
        changes.push(ClassificationChange::CategoriesAdded {
            categories: added.into_iter().collect(),
        });
    }

    if posting.visa_friendly == VisaFriendly::Unknown {
        let detected = visa::detect_visa_friendly(
            &posting.title,
            &posting.description,
            &posting.employer_raw,
        );
        if detected.is_definite() {
            posting.visa_friendly = detected;
            changes.push(ClassificationChange::VisaSet { value: detected });
        }
    }

    changes
}

/// Classify every posting of a pool in place.
pub fn classify_pool(postings: &mut [Posting]) -> ClassificationReport {
    let mut report = ClassificationReport {
        examined: postings.len(),
        ..ClassificationReport::default()
    };

    for posting in postings.iter_mut() {
        let changes = classify(posting);
        if !changes.is_empty() {
            report.postings.push(PostingChanges {
                hash: posting.hash.clone(),
                changes,
            });
        }
    }

    report
}
