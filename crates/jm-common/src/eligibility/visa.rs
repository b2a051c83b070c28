use once_cell::sync::Lazy;
use regex::Regex;

use crate::normalize::{contains_any_term, fold};
use crate::taxonomy::VisaFriendly;

/// Refusals phrased around the word, matched on folded text: a negation a
/// few words before "sponsor*", or a "requiring sponsorship will not be
/// considered" clause.
static REFUSAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\b(?:cannot|can not|can t|unable|not able|will not|won t|do not|don t|does not|doesn t)",
        r"(?: \w+){0,5}? sponsor\w*",
        r"|\bno(?: \w+){0,2}? sponsor\w*",
        r"|\brequir\w*(?: \w+){0,3} sponsor\w* (?:will|would|shall) not be considered",
    ))
    .expect("valid visa refusal regex")
});

/// Phrases that rule sponsorship out. Checked first: "no visa sponsorship"
/// also contains the positive phrase "visa sponsorship".
const NEGATIVE_PHRASES: &[&str] = &[
    "no visa sponsorship",
    "no sponsorship",
    "unable to sponsor",
    "cannot sponsor",
    "can not sponsor",
    "not able to sponsor",
    "will not sponsor",
    "do not sponsor",
    "does not sponsor",
    "not offer visa sponsorship",
    "not offer sponsorship",
    "not provide sponsorship",
    "not provide visa sponsorship",
    "sponsorship is not available",
    "sponsorship not available",
    "must have the right to work",
    "must already have the right to work",
    "must be eligible to work",
    "eu citizenship required",
    "eu work permit required",
    "sans sponsorisation",
    "pas de sponsorisation",
    "keine visa sponsorship",
    "kein visum",
    "sin patrocinio",
    "nessuna sponsorizzazione",
];

const POSITIVE_PHRASES: &[&str] = &[
    "visa sponsorship",
    "visa sponsorship available",
    "sponsorship available",
    "we sponsor",
    "will sponsor",
    "can sponsor",
    "able to sponsor",
    "skilled worker visa",
    "tier 2",
    "visa support",
    "visa assistance",
    "relocation and visa",
    "blue card",
    "blaue karte",
    "work permit support",
    "sponsorisation",
    "patrocinio de visa",
];

/// Text heuristic over title, description and employer.
pub fn detect_visa_friendly(title: &str, description: &str, employer: &str) -> VisaFriendly {
    let text = fold(&format!("{title} {description} {employer}"));
    if REFUSAL.is_match(&text) || contains_any_term(&text, NEGATIVE_PHRASES) {
        VisaFriendly::No
    } else if contains_any_term(&text, POSITIVE_PHRASES) {
        VisaFriendly::Yes
    } else {
        VisaFriendly::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_phrases_win() {
        assert_eq!(
            detect_visa_friendly("Analyst", "Please note: no visa sponsorship is offered.", "Acme"),
            VisaFriendly::No
        );
        assert_eq!(
            detect_visa_friendly("Analyst", "We are unable to sponsor work permits.", "Acme"),
            VisaFriendly::No
        );
    }

    #[test]
    fn refusals_around_the_positive_phrase_are_no() {
        for description in [
            "We cannot offer visa sponsorship.",
            "Candidates requiring visa sponsorship will not be considered.",
            "We are not able to provide visa sponsorship.",
            "We can’t provide Skilled Worker visa sponsorship for this role.",
            "Unfortunately we won't be able to sponsor.",
            "No Tier 2 sponsorship is available.",
        ] {
            assert_eq!(
                detect_visa_friendly("Graduate Analyst", description, "Acme"),
                VisaFriendly::No,
                "{description}"
            );
        }
    }

    #[test]
    fn a_distant_no_does_not_read_as_refusal() {
        assert_eq!(
            detect_visa_friendly(
                "Graduate Analyst",
                "No prior experience needed and we offer visa sponsorship.",
                "Acme"
            ),
            VisaFriendly::Yes
        );
    }

    #[test]
    fn positive_phrases_set_yes() {
        assert_eq!(
            detect_visa_friendly("Graduate Engineer", "Skilled Worker visa sponsorship available.", "Acme"),
            VisaFriendly::Yes
        );
        assert_eq!(
            detect_visa_friendly("Data Analyst", "Unterstützung bei der Blauen Karte / Blue Card.", "Acme"),
            VisaFriendly::Yes
        );
    }

    #[test]
    fn silence_stays_unknown() {
        assert_eq!(
            detect_visa_friendly("Graduate Analyst", "Join our London team.", "Acme"),
            VisaFriendly::Unknown
        );
    }
}
