//! Raw posting → normalized [`Posting`].
//!
//! Sources disagree on field names and fill optional fields with whatever
//! they have. Records are read leniently into [`RawPosting`] (core fields
//! plus a typed extension map), validated once here, and only fully formed
//! postings travel further down the pipeline.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::Posting;
use crate::corrections::{detect_early_career, detect_work_mode, normalize_location};
use crate::normalize::{collapse_whitespace, content_hash};
use crate::taxonomy::{Category, VisaFriendly};

/// One raw record as handed over by a job-source adapter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawPosting {
    pub title: Option<String>,
    #[serde(alias = "company", alias = "employerName", alias = "company_name")]
    pub employer: Option<String>,
    pub location: Option<String>,
    #[serde(alias = "jobDescription", alias = "job_description")]
    pub description: Option<String>,
    #[serde(
        alias = "link",
        alias = "sourceUrl",
        alias = "source_url",
        alias = "jobUrl",
        alias = "job_url"
    )]
    pub url: Option<String>,
    #[serde(alias = "origin", alias = "originSource", alias = "origin_source")]
    pub source: Option<String>,
    #[serde(alias = "posted_at", alias = "datePosted", alias = "date_posted")]
    pub posted_at: Option<String>,
    #[serde(flatten)]
    pub extensions: RawExtensions,
}

/// Optional source-specific fields. Anything not named here lands in `other`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawExtensions {
    #[serde(alias = "employment_type", alias = "jobType", alias = "job_type")]
    pub employment_type: Option<String>,
    pub salary: Option<serde_json::Value>,
    #[serde(alias = "isRemote", alias = "is_remote")]
    pub remote: Option<bool>,
    pub categories: Vec<String>,
    pub language: Option<String>,
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("missing required fields: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("malformed record: {0}")]
    Malformed(String),
}

impl ValidationError {
    pub fn missing_fields(&self) -> &[&'static str] {
        match self {
            ValidationError::MissingFields(fields) => fields,
            ValidationError::Malformed(_) => &[],
        }
    }
}

/// A record the canonicalizer refused, with its position in the input batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordRejection {
    pub index: usize,
    pub source: Option<String>,
    #[serde(serialize_with = "serialize_display")]
    pub error: ValidationError,
}

fn serialize_display<S: serde::Serializer>(
    error: &ValidationError,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(error)
}

#[derive(Debug, Default)]
pub struct CanonicalBatch {
    pub postings: Vec<Posting>,
    pub rejected: Vec<RecordRejection>,
}

fn required(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(collapse_whitespace)
        .filter(|v| !v.is_empty())
}

fn parse_posted_at(value: &str) -> Option<DateTime<Utc>> {
    let trimmed = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

impl RawPosting {
    pub fn from_json(value: serde_json::Value) -> Result<Self, ValidationError> {
        serde_json::from_value(value).map_err(|err| ValidationError::Malformed(err.to_string()))
    }
}

/// Turn one raw record into a [`Posting`] first seen at `seen_at`.
///
/// Pure: no I/O, no clock. Fails with the list of missing core fields when
/// any of title, employer, location, description, url or source is absent
/// or blank.
pub fn canonicalize(raw: &RawPosting, seen_at: DateTime<Utc>) -> Result<Posting, ValidationError> {
    let title = required(&raw.title);
    let employer = required(&raw.employer);
    let location = required(&raw.location);
    let description = raw
        .description
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let url = required(&raw.url);
    let source = required(&raw.source);

    let (Some(title), Some(employer), Some(location), Some(description), Some(url), Some(source)) =
        (title, employer, location, description, url, source)
    else {
        let mut missing = Vec::new();
        for (name, present) in [
            ("title", required(&raw.title).is_some()),
            ("employer", required(&raw.employer).is_some()),
            ("location", required(&raw.location).is_some()),
            (
                "description",
                raw.description.as_deref().is_some_and(|v| !v.trim().is_empty()),
            ),
            ("url", required(&raw.url).is_some()),
            ("source", required(&raw.source).is_some()),
        ] {
            if !present {
                missing.push(name);
            }
        }
        return Err(ValidationError::MissingFields(missing));
    };

    let location = normalize_location(&location);
    let hash = content_hash(&title, &employer, &location);
    let ext = &raw.extensions;

    let signals = detect_early_career(&title, ext.employment_type.as_deref());
    let mut categories: BTreeSet<Category> = ext
        .categories
        .iter()
        .filter_map(|tag| Category::from_career_path(tag))
        .collect();
    if signals.is_early_career {
        categories.insert(Category::EarlyCareer);
    }

    let work_mode = detect_work_mode(&location, ext.remote, &title, description);
    let posted_at = raw.posted_at.as_deref().and_then(|value| {
        let parsed = parse_posted_at(value);
        if parsed.is_none() {
            debug!(hash = %hash, posted_at = value, "unparseable postedAt ignored");
        }
        parsed
    });

    Ok(Posting {
        hash,
        title,
        employer_display: Some(employer.clone()),
        employer_raw: employer,
        location,
        description: description.to_string(),
        source_url: url,
        origin_source: source,
        categories,
        is_internship: signals.is_internship,
        is_graduate_program: signals.is_graduate_program,
        visa_friendly: VisaFriendly::Unknown,
        work_mode,
        active: true,
        filtered_reason: None,
        posted_at,
        last_seen_at: seen_at,
        created_at: seen_at,
    })
}

/// Canonicalize a batch of JSON records. Rejections never abort the batch.
pub fn canonicalize_batch(records: Vec<serde_json::Value>, seen_at: DateTime<Utc>) -> CanonicalBatch {
    let mut batch = CanonicalBatch::default();

    for (index, value) in records.into_iter().enumerate() {
        let source_hint = value
            .get("source")
            .or_else(|| value.get("origin"))
            .and_then(|v| v.as_str())
            .map(str::to_string);

        let result = RawPosting::from_json(value).and_then(|raw| canonicalize(&raw, seen_at));
        match result {
            Ok(posting) => batch.postings.push(posting),
            Err(error) => {
                debug!(index, source = ?source_hint, %error, "raw posting rejected");
                batch.rejected.push(RecordRejection {
                    index,
                    source: source_hint,
                    error,
                });
            }
        }
    }

    batch
}
