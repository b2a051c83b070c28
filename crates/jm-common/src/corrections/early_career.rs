use crate::normalize::{contains_any_term, fold};

const INTERNSHIP_TERMS: &[&str] = &[
    "intern",
    "internship",
    "summer intern",
    "industrial placement",
    "placement year",
    "stagiaire",
    "stage de fin d etudes",
    "alternance",
    "alternant",
    "praktikum",
    "praktikant",
    "praktikantin",
    "pasantia",
    "becario",
    "becaria",
    "tirocinio",
    "stagista",
    "stagiair",
    "stageplaats",
];

const GRADUATE_TERMS: &[&str] = &[
    "graduate",
    "graduate programme",
    "graduate program",
    "graduate scheme",
    "grad scheme",
    "new grad",
    "traineeship",
    "trainee programme",
    "trainee program",
    "jeune diplome",
    "jeune diplomee",
    "berufseinsteiger",
    "absolvent",
    "absolventin",
    "neolaureato",
    "neolaureata",
    "recien graduado",
    "recien titulado",
];

const ENTRY_LEVEL_TERMS: &[&str] = &[
    "junior",
    "entry level",
    "trainee",
    "apprentice",
    "apprenticeship",
    "working student",
    "werkstudent",
    "werkstudentin",
    "einsteiger",
    "debutant",
    "early careers",
    "early career",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EarlyCareerSignals {
    pub is_internship: bool,
    pub is_graduate_program: bool,
    /// Any early-career signal at all, including junior/entry-level wording.
    pub is_early_career: bool,
}

/// Scan a title and the source's employment type for early-career wording.
pub fn detect_early_career(title: &str, employment_type: Option<&str>) -> EarlyCareerSignals {
    let title = fold(title);
    let employment = employment_type.map(fold).unwrap_or_default();

    let is_internship = contains_any_term(&title, INTERNSHIP_TERMS)
        || contains_any_term(&employment, &["internship", "intern", "stage", "praktikum"]);
    let is_graduate_program = contains_any_term(&title, GRADUATE_TERMS)
        || contains_any_term(&employment, &["graduate", "graduate programme", "graduate program"]);
    let entry_level = contains_any_term(&title, ENTRY_LEVEL_TERMS)
        || contains_any_term(&employment, &["entry level", "junior", "entry", "trainee"]);

    EarlyCareerSignals {
        is_internship,
        is_graduate_program,
        is_early_career: is_internship || is_graduate_program || entry_level,
    }
}
