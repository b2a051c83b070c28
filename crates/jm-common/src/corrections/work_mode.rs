use crate::REMOTE_LOCATION;
use crate::normalize::{contains_any_term, fold};
use crate::taxonomy::WorkMode;

const REMOTE_TERMS: &[&str] = &[
    "fully remote",
    "100 remote",
    "remote first",
    "remote only",
    "work from home",
    "full remote",
    "teletravail complet",
    "100 teletravail",
    "vollstandig remote",
    "completamente remoto",
];

const HYBRID_TERMS: &[&str] = &[
    "hybrid",
    "hybride",
    "hibrido",
    "ibrido",
    "hybrid working",
    "teletravail partiel",
    "mobiles arbeiten",
];

const ON_SITE_TERMS: &[&str] = &[
    "on site",
    "onsite",
    "in office",
    "office based",
    "in person",
    "sur site",
    "presentiel",
    "vor ort",
    "presencial",
    "in sede",
    "op kantoor",
];

/// Detect the work mode of a posting.
///
/// A `remote` location or an explicit remote flag from the source wins;
/// otherwise the title and description are scanned, hybrid before remote
/// before on-site, since "hybrid" postings routinely mention office days.
pub fn detect_work_mode(
    normalized_location: &str,
    remote_flag: Option<bool>,
    title: &str,
    description: &str,
) -> WorkMode {
    if normalized_location == REMOTE_LOCATION || remote_flag == Some(true) {
        return WorkMode::Remote;
    }

    let text = fold(&format!("{title} {description}"));
    if contains_any_term(&text, HYBRID_TERMS) {
        WorkMode::Hybrid
    } else if contains_any_term(&text, REMOTE_TERMS) {
        WorkMode::Remote
    } else if contains_any_term(&text, ON_SITE_TERMS) || remote_flag == Some(false) {
        WorkMode::OnSite
    } else {
        WorkMode::Unknown
    }
}
