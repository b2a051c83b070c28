//! Fixed vocabularies shared by the classifier, the selector and storage.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter, EnumString, IntoEnumIterator};

use crate::normalize::fold;

/// Functional category tags a posting can carry.
///
/// `EarlyCareer` is the default tag set at canonicalization and does not
/// count as a specific category; `Generalist` is the fallback the backfill
/// appends when nothing specific matched.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Category {
    EarlyCareer,
    DataAnalytics,
    StrategyConsulting,
    FinanceInvestment,
    TechEngineering,
    OperationsSupplyChain,
    SalesClient,
    MarketingGrowth,
    ProductInnovation,
    Generalist,
}

impl Category {
    pub fn slug(&self) -> &'static str {
        match self {
            Category::EarlyCareer => "early-career",
            Category::DataAnalytics => "data-analytics",
            Category::StrategyConsulting => "strategy-consulting",
            Category::FinanceInvestment => "finance-investment",
            Category::TechEngineering => "tech-engineering",
            Category::OperationsSupplyChain => "operations-supply-chain",
            Category::SalesClient => "sales-client",
            Category::MarketingGrowth => "marketing-growth",
            Category::ProductInnovation => "product-innovation",
            Category::Generalist => "generalist",
        }
    }

    /// Career-path label as shown in the preference form.
    pub fn label(&self) -> &'static str {
        match self {
            Category::EarlyCareer => "Early Career",
            Category::DataAnalytics => "Data & Analytics",
            Category::StrategyConsulting => "Strategy & Business Design",
            Category::FinanceInvestment => "Finance & Investment",
            Category::TechEngineering => "Tech & Transformation",
            Category::OperationsSupplyChain => "Operations & Supply Chain",
            Category::SalesClient => "Sales & Client Success",
            Category::MarketingGrowth => "Marketing & Growth",
            Category::ProductInnovation => "Product & Innovation",
            Category::Generalist => "Generalist / Rotational",
        }
    }

    pub fn is_specific(&self) -> bool {
        !matches!(self, Category::EarlyCareer)
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Category::from_str(slug.trim()).ok()
    }

    /// Map a career-path tag from a user profile onto a category. Accepts the
    /// slug, the label, or the label with punctuation dropped
    /// ("data analytics", "Finance and Investment").
    pub fn from_career_path(tag: &str) -> Option<Self> {
        if let Some(category) = Self::from_slug(&tag.to_ascii_lowercase()) {
            return Some(category);
        }

        let wanted = fold(tag).replace(" and ", " ");
        if wanted.is_empty() {
            return None;
        }

        Category::iter().find(|category| {
            let label = fold(category.label());
            let slug = fold(category.slug());
            label == wanted || slug == wanted || label.starts_with(&wanted)
        })
    }
}

/// Hard-eligibility reason attached to a deactivated posting.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    AsRefStr,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FilteredReason {
    JobBoardAsCompany,
    ExecutiveRole,
    ConstructionRole,
    MedicalRole,
    LegalRole,
    TeachingRole,
}

impl FilteredReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilteredReason::JobBoardAsCompany => "job_board_as_company",
            FilteredReason::ExecutiveRole => "executive_role",
            FilteredReason::ConstructionRole => "construction_role",
            FilteredReason::MedicalRole => "medical_role",
            FilteredReason::LegalRole => "legal_role",
            FilteredReason::TeachingRole => "teaching_role",
        }
    }
}

/// Tri-state visa friendliness of a posting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisaFriendly {
    Yes,
    No,
    #[default]
    Unknown,
}

impl VisaFriendly {
    pub fn from_db(value: Option<bool>) -> Self {
        match value {
            Some(true) => VisaFriendly::Yes,
            Some(false) => VisaFriendly::No,
            None => VisaFriendly::Unknown,
        }
    }

    pub fn to_db(self) -> Option<bool> {
        match self {
            VisaFriendly::Yes => Some(true),
            VisaFriendly::No => Some(false),
            VisaFriendly::Unknown => None,
        }
    }

    pub fn is_definite(self) -> bool {
        !matches!(self, VisaFriendly::Unknown)
    }
}

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum WorkMode {
    Remote,
    Hybrid,
    OnSite,
    #[default]
    Unknown,
}

/// Visa situation declared in a user profile. Only `NeedsSponsorship`
/// constrains candidate selection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisaStatus {
    #[serde(alias = "needs_visa", alias = "sponsorship_required")]
    NeedsSponsorship,
    #[serde(alias = "eu_citizen_or_resident")]
    EuCitizen,
    #[serde(alias = "work_permit")]
    HasWorkPermit,
    #[default]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryLevelPreference {
    Internship,
    #[serde(alias = "graduate_program", alias = "graduate_scheme")]
    GraduateProgramme,
    #[serde(alias = "junior")]
    EntryLevel,
    WorkingStudent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkEnvironment {
    Remote,
    Hybrid,
    #[serde(alias = "on_site", alias = "onsite")]
    Office,
}

impl WorkEnvironment {
    pub fn accepts(self, mode: WorkMode) -> bool {
        matches!(
            (self, mode),
            (WorkEnvironment::Remote, WorkMode::Remote)
                | (WorkEnvironment::Hybrid, WorkMode::Hybrid)
                | (WorkEnvironment::Office, WorkMode::OnSite)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, AsRefStr, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum QualityTier {
    Excellent,
    Good,
    Fair,
}

impl QualityTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            QualityTier::Excellent
        } else if score >= 0.70 {
            QualityTier::Good
        } else {
            QualityTier::Fair
        }
    }
}
