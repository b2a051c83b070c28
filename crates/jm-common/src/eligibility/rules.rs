//! Hard-eligibility rule table and its interpreter.
//!
//! Every rule is data: which text it looks at, how terms are matched, the
//! positive terms that trigger it, the negative terms that exempt a hit, and
//! what happens to the posting. Order is significant; the first deactivating
//! hit wins.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::Posting;
use crate::normalize::fold;
use crate::taxonomy::FilteredReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleTarget {
    Employer,
    Title,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Whole folded value equals a term (legal-form suffixes ignored).
    Exact,
    /// Term occurs anywhere in the folded value.
    Fragment,
    /// Term occurs as whole words in the folded value.
    WholeWord,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleEffect {
    pub reason: FilteredReason,
    pub clear_employer_display: bool,
}

impl RuleEffect {
    const fn deactivate(reason: FilteredReason) -> Self {
        Self {
            reason,
            clear_employer_display: false,
        }
    }

    const fn job_board() -> Self {
        Self {
            reason: FilteredReason::JobBoardAsCompany,
            clear_employer_display: true,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EligibilityRule {
    pub name: &'static str,
    pub target: RuleTarget,
    pub mode: MatchMode,
    /// Folded terms.
    pub positive: &'static [&'static str],
    /// Folded terms, always matched as whole words.
    pub negative: &'static [&'static str],
    pub effect: RuleEffect,
}

const JOB_BOARD_NAMES: &[&str] = &[
    "indeed",
    "linkedin",
    "linkedin jobs",
    "glassdoor",
    "monster",
    "reed",
    "reed co uk",
    "reed recruitment",
    "totaljobs",
    "cv library",
    "stepstone",
    "jobteaser",
    "welcome to the jungle",
    "ziprecruiter",
    "adzuna",
    "jooble",
    "talent com",
    "simplyhired",
    "careerbuilder",
    "careerjet",
    "jobsite",
    "graduateland",
    "gradcracker",
    "milkround",
    "targetjobs",
    "prospects",
    "efinancialcareers",
    "infojobs",
    "xing",
    "apec",
    "pole emploi",
    "france travail",
    "hellowork",
    "jobrapido",
];

const JOB_BOARD_FRAGMENTS: &[&str] = &[
    "indeed",
    "linkedin",
    "glassdoor",
    "stepstone",
    "totaljobs",
    "jobteaser",
    "ziprecruiter",
    "adzuna",
    "jooble",
    "careerjet",
    "jobrapido",
    "job board",
    "jobboard",
    "jobs com",
    "jobs co uk",
    "reed co uk",
];

const JOB_BOARD_EXEMPTIONS: &[&str] = &[
    "recruitment",
    "recruiting",
    "staffing",
    "placement",
    "placements",
    "recrutement",
    "personalvermittlung",
];

const EXECUTIVE_TERMS: &[&str] = &[
    "ceo",
    "cfo",
    "cto",
    "coo",
    "cmo",
    "cio",
    "chief",
    "chief executive officer",
    "vice president",
    "vp",
    "svp",
    "evp",
    "managing director",
    "head of",
    "director",
    "president",
    "directeur",
    "directrice",
    "direktor",
    "direktorin",
    "geschaftsfuhrer",
    "geschaftsfuhrerin",
    "director general",
    "direttore",
    "directeur general",
];

const EXECUTIVE_EXEMPTIONS: &[&str] = &[
    "assistant",
    "assistante",
    "assistent",
    "intern",
    "internship",
    "graduate",
    "trainee",
    "coordinator",
    "analyst",
    "stagiaire",
    "praktikant",
    "praktikantin",
    "office of the",
];

const CONSTRUCTION_TERMS: &[&str] = &[
    "construction",
    "site manager",
    "site engineer",
    "quantity surveyor",
    "bricklayer",
    "carpenter",
    "electrician",
    "plumber",
    "scaffolder",
    "foreman",
    "civil engineer",
    "chef de chantier",
    "conducteur de travaux",
    "bauleiter",
    "bauleiterin",
    "maurer",
    "jefe de obra",
    "albanil",
    "capocantiere",
    "muratore",
    "uitvoerder",
];

const CONSTRUCTION_EXEMPTIONS: &[&str] = &["project manager", "consultant", "analyst"];

const MEDICAL_TERMS: &[&str] = &[
    "nurse",
    "nursing",
    "physician",
    "doctor",
    "surgeon",
    "dentist",
    "pharmacist",
    "midwife",
    "paramedic",
    "physiotherapist",
    "radiographer",
    "healthcare assistant",
    "care assistant",
    "infirmier",
    "infirmiere",
    "medecin",
    "pflegefachkraft",
    "krankenpfleger",
    "arzt",
    "arztin",
    "enfermero",
    "enfermera",
    "medico",
    "infermiere",
    "verpleegkundige",
];

const MEDICAL_EXEMPTIONS: &[&str] = &["analyst", "data", "sales", "software", "consultant"];

const LEGAL_TERMS: &[&str] = &[
    "lawyer",
    "solicitor",
    "barrister",
    "attorney",
    "paralegal",
    "legal counsel",
    "legal advisor",
    "legal adviser",
    "counsel",
    "avocat",
    "avocate",
    "juriste",
    "rechtsanwalt",
    "rechtsanwaltin",
    "jurist",
    "abogado",
    "abogada",
    "avvocato",
    "advocaat",
    "notary",
    "notaire",
];

const LEGAL_EXEMPTIONS: &[&str] = &[
    "compliance",
    "analyst",
    "junior",
    "graduate",
    "intern",
    "internship",
    "business",
    "stagiaire",
    "praktikant",
];

const TEACHING_TERMS: &[&str] = &[
    "teacher",
    "teaching assistant",
    "lecturer",
    "professor",
    "tutor",
    "schoolteacher",
    "enseignant",
    "enseignante",
    "professeur",
    "instituteur",
    "lehrer",
    "lehrerin",
    "profesor",
    "profesora",
    "insegnante",
    "docent",
    "leraar",
];

const TEACHING_EXEMPTIONS: &[&str] = &["analyst", "sales", "software", "engineer"];

/// Ordered rule table. Job-board rules run before profession rules.
pub static RULES: &[EligibilityRule] = &[
    EligibilityRule {
        name: "job_board_exact_name",
        target: RuleTarget::Employer,
        mode: MatchMode::Exact,
        positive: JOB_BOARD_NAMES,
        negative: &[],
        effect: RuleEffect::job_board(),
    },
    EligibilityRule {
        name: "job_board_name_fragment",
        target: RuleTarget::Employer,
        mode: MatchMode::Fragment,
        positive: JOB_BOARD_FRAGMENTS,
        negative: JOB_BOARD_EXEMPTIONS,
        effect: RuleEffect::job_board(),
    },
    EligibilityRule {
        name: "executive_title",
        target: RuleTarget::Title,
        mode: MatchMode::WholeWord,
        positive: EXECUTIVE_TERMS,
        negative: EXECUTIVE_EXEMPTIONS,
        effect: RuleEffect::deactivate(FilteredReason::ExecutiveRole),
    },
    EligibilityRule {
        name: "construction_trade_title",
        target: RuleTarget::Title,
        mode: MatchMode::WholeWord,
        positive: CONSTRUCTION_TERMS,
        negative: CONSTRUCTION_EXEMPTIONS,
        effect: RuleEffect::deactivate(FilteredReason::ConstructionRole),
    },
    EligibilityRule {
        name: "medical_title",
        target: RuleTarget::Title,
        mode: MatchMode::WholeWord,
        positive: MEDICAL_TERMS,
        negative: MEDICAL_EXEMPTIONS,
        effect: RuleEffect::deactivate(FilteredReason::MedicalRole),
    },
    EligibilityRule {
        name: "legal_title",
        target: RuleTarget::Title,
        mode: MatchMode::WholeWord,
        positive: LEGAL_TERMS,
        negative: LEGAL_EXEMPTIONS,
        effect: RuleEffect::deactivate(FilteredReason::LegalRole),
    },
    EligibilityRule {
        name: "teaching_title",
        target: RuleTarget::Title,
        mode: MatchMode::WholeWord,
        positive: TEACHING_TERMS,
        negative: TEACHING_EXEMPTIONS,
        effect: RuleEffect::deactivate(FilteredReason::TeachingRole),
    },
];

const LEGAL_FORM_SUFFIXES: &[&str] = &[
    "ltd", "limited", "plc", "inc", "llc", "gmbh", "ag", "sa", "sas", "bv", "nv", "srl", "spa",
    "group", "uk",
];

fn word_regex(terms: &[&str]) -> Option<Regex> {
    if terms.is_empty() {
        return None;
    }
    let alternation = terms
        .iter()
        .map(|term| regex::escape(term))
        .collect::<Vec<_>>()
        .join("|");
    Some(Regex::new(&format!(r"\b(?:{alternation})\b")).expect("rule terms compile"))
}

struct CompiledRule {
    rule: &'static EligibilityRule,
    exact: HashSet<&'static str>,
    positive: Option<Regex>,
    negative: Option<Regex>,
}

static COMPILED: Lazy<Vec<CompiledRule>> = Lazy::new(|| {
    RULES
        .iter()
        .map(|rule| CompiledRule {
            rule,
            exact: match rule.mode {
                MatchMode::Exact => rule.positive.iter().copied().collect(),
                _ => HashSet::new(),
            },
            positive: match rule.mode {
                MatchMode::WholeWord => word_regex(rule.positive),
                _ => None,
            },
            negative: word_regex(rule.negative),
        })
        .collect()
});

/// Folded texts a posting is judged on, prepared once per posting.
#[derive(Debug, Clone)]
pub struct RuleInput {
    employer: String,
    title: String,
}

impl RuleInput {
    pub fn from_posting(posting: &Posting) -> Self {
        Self {
            employer: fold(&posting.employer_raw),
            title: fold(&posting.title),
        }
    }

    fn text(&self, target: RuleTarget) -> &str {
        match target {
            RuleTarget::Employer => &self.employer,
            RuleTarget::Title => &self.title,
        }
    }
}

fn strip_legal_form(folded: &str) -> &str {
    let mut current = folded;
    while let Some((head, last)) = current.rsplit_once(' ') {
        if LEGAL_FORM_SUFFIXES.contains(&last) {
            current = head;
        } else {
            break;
        }
    }
    current
}

impl CompiledRule {
    fn matches(&self, input: &RuleInput) -> bool {
        let text = input.text(self.rule.target);
        if text.is_empty() {
            return false;
        }

        let positive = match self.rule.mode {
            MatchMode::Exact => {
                self.exact.contains(text) || self.exact.contains(strip_legal_form(text))
            }
            MatchMode::Fragment => self.rule.positive.iter().any(|term| text.contains(term)),
            MatchMode::WholeWord => self
                .positive
                .as_ref()
                .is_some_and(|regex| regex.is_match(text)),
        };
        if !positive {
            return false;
        }

        !self
            .negative
            .as_ref()
            .is_some_and(|regex| regex.is_match(text))
    }
}

/// First rule in table order that deactivates the posting, if any.
pub fn first_hit(input: &RuleInput) -> Option<&'static EligibilityRule> {
    COMPILED
        .iter()
        .find(|compiled| compiled.matches(input))
        .map(|compiled| compiled.rule)
}

/// Evaluate a single named rule. Used to audit rules independently.
pub fn rule_matches(name: &str, input: &RuleInput) -> bool {
    COMPILED
        .iter()
        .find(|compiled| compiled.rule.name == name)
        .is_some_and(|compiled| compiled.matches(input))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::posting;

    fn hit(title: &str, employer: &str) -> Option<FilteredReason> {
        let input = RuleInput::from_posting(&posting(title, employer, "London, GB"));
        first_hit(&input).map(|rule| rule.effect.reason)
    }

    #[test]
    fn terms_are_stored_folded() {
        for rule in RULES {
            for term in rule.positive.iter().chain(rule.negative) {
                assert_eq!(fold(term), *term, "rule {} term {term:?}", rule.name);
            }
        }
    }

    #[test]
    fn exact_job_board_names_ignore_legal_form() {
        assert_eq!(hit("Analyst", "Reed Recruitment"), Some(FilteredReason::JobBoardAsCompany));
        assert_eq!(hit("Analyst", "Indeed Ltd."), Some(FilteredReason::JobBoardAsCompany));
        assert_eq!(hit("Analyst", "Acme"), None);
    }

    #[test]
    fn fragment_rule_respects_recruiter_exemption() {
        assert_eq!(
            hit("Analyst", "Glassdoor Jobs Europe"),
            Some(FilteredReason::JobBoardAsCompany)
        );
        let input = RuleInput::from_posting(&posting("Analyst", "Jobboard Staffing Partners", "x"));
        assert!(!rule_matches("job_board_name_fragment", &input));
    }

    #[test]
    fn construction_exempts_project_managers() {
        assert_eq!(hit("Senior Construction Project Manager", "Acme"), None);
        assert_eq!(hit("Construction Site Supervisor", "Acme"), Some(FilteredReason::ConstructionRole));
    }

    #[test]
    fn legal_counsel_is_flagged_but_compliance_is_not() {
        assert_eq!(hit("Legal Counsel", "Acme"), Some(FilteredReason::LegalRole));
        assert_eq!(hit("Legal Counsel, Compliance", "Acme"), None);
        assert_eq!(hit("Junior Legal Advisor", "Acme"), None);
        assert_eq!(hit("Avocat Fiscaliste", "Cabinet Dupont"), Some(FilteredReason::LegalRole));
    }

    #[test]
    fn executive_terms_use_word_boundaries() {
        assert_eq!(hit("Chief Financial Officer", "Acme"), Some(FilteredReason::ExecutiveRole));
        assert_eq!(hit("Geschäftsführer (m/w/d)", "Acme GmbH"), Some(FilteredReason::ExecutiveRole));
        assert_eq!(hit("Executive Assistant to the CEO", "Acme"), None);
        assert_eq!(hit("Directory Data Analyst", "Acme"), None);
        assert_eq!(hit("Vector Graphics Intern", "Acme"), None);
    }

    #[test]
    fn first_deactivating_rule_wins() {
        // Matches both the job-board and the executive rule.
        assert_eq!(hit("Managing Director", "LinkedIn"), Some(FilteredReason::JobBoardAsCompany));
    }

    #[test]
    fn other_professions() {
        assert_eq!(hit("Registered Nurse", "NHS Trust"), Some(FilteredReason::MedicalRole));
        assert_eq!(hit("Nurse Staffing Analyst", "NHS Trust"), None);
        assert_eq!(hit("Secondary School Teacher", "Academy"), Some(FilteredReason::TeachingRole));
        assert_eq!(hit("Graduate Data Analyst", "Acme"), None);
    }
}
