use std::collections::BTreeSet;

use crate::Posting;
use crate::normalize::{contains_term, fold};
use crate::taxonomy::Category;

/// Folded keyword → category table, EN/FR/DE/ES/IT/NL.
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::DataAnalytics,
        &[
            "data",
            "analytics",
            "data analyst",
            "data scientist",
            "data science",
            "business intelligence",
            "bi",
            "insights",
            "machine learning",
            "statistics",
            "statistician",
            "quantitative",
            "donnees",
            "analyste de donnees",
            "datenanalyse",
            "datenanalyst",
            "datos",
            "dati",
        ],
    ),
    (
        Category::StrategyConsulting,
        &[
            "strategy",
            "strategic",
            "consulting",
            "consultant",
            "management consulting",
            "business design",
            "advisory",
            "strategie",
            "conseil",
            "beratung",
            "berater",
            "unternehmensberatung",
            "consultoria",
            "consultor",
            "consulenza",
            "consulente",
            "adviseur",
        ],
    ),
    (
        Category::FinanceInvestment,
        &[
            "finance",
            "financial",
            "investment",
            "investments",
            "banking",
            "accounting",
            "accountant",
            "audit",
            "auditor",
            "treasury",
            "controlling",
            "controller",
            "private equity",
            "venture capital",
            "asset management",
            "wealth management",
            "tax",
            "actuarial",
            "comptable",
            "comptabilite",
            "finances",
            "finanzen",
            "buchhaltung",
            "finanzas",
            "contabilidad",
            "finanza",
            "financien",
        ],
    ),
    (
        Category::TechEngineering,
        &[
            "software",
            "developer",
            "engineer",
            "engineering",
            "devops",
            "cloud",
            "cybersecurity",
            "backend",
            "frontend",
            "full stack",
            "programmer",
            "it support",
            "technology",
            "transformation",
            "ingenieur",
            "developpeur",
            "informatique",
            "entwickler",
            "informatik",
            "desarrollador",
            "ingeniero",
            "sviluppatore",
            "ingegnere",
            "ontwikkelaar",
        ],
    ),
    (
        Category::OperationsSupplyChain,
        &[
            "operations",
            "supply chain",
            "logistics",
            "procurement",
            "purchasing",
            "sourcing",
            "planner",
            "demand planning",
            "inventory",
            "lean",
            "logistique",
            "achats",
            "einkauf",
            "logistik",
            "compras",
            "logistica",
            "acquisti",
            "inkoop",
        ],
    ),
    (
        Category::SalesClient,
        &[
            "sales",
            "business development",
            "account manager",
            "account executive",
            "customer success",
            "client",
            "key account",
            "commercial",
            "vente",
            "ventes",
            "vertrieb",
            "kundenbetreuung",
            "ventas",
            "vendite",
            "verkoop",
        ],
    ),
    (
        Category::MarketingGrowth,
        &[
            "marketing",
            "growth",
            "brand",
            "seo",
            "social media",
            "communications",
            "communication",
            "digital marketing",
            "public relations",
            "ecommerce",
            "e commerce",
            "kommunikation",
            "comunicacion",
            "comunicazione",
        ],
    ),
    (
        Category::ProductInnovation,
        &[
            "product",
            "product manager",
            "product owner",
            "innovation",
            "ux",
            "user research",
            "product design",
            "produit",
            "produkt",
            "producto",
            "prodotto",
        ],
    ),
    (
        Category::Generalist,
        &[
            "rotational",
            "rotation",
            "general management",
            "leadership programme",
            "leadership program",
        ],
    ),
];

/// Description hits needed before a category is admitted from the body text.
pub const DESCRIPTION_MIN_HITS: usize = 2;

/// Categories whose keywords appear in the title.
pub fn categories_from_title(title: &str) -> BTreeSet<Category> {
    let folded = fold(title);
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| keywords.iter().any(|kw| contains_term(&folded, kw)))
        .map(|(category, _)| *category)
        .collect()
}

/// Categories with at least [`DESCRIPTION_MIN_HITS`] distinct keywords in
/// the description.
pub fn categories_from_description(description: &str) -> BTreeSet<Category> {
    let folded = fold(description);
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| {
            let hits: BTreeSet<&str> = keywords
                .iter()
                .copied()
                .filter(|kw| contains_term(&folded, kw))
                .collect();
            hits.len() >= DESCRIPTION_MIN_HITS
        })
        .map(|(category, _)| *category)
        .collect()
}

/// Categories to append to a posting that carries no specific category yet.
/// Returns an empty set when nothing should change.
pub fn backfill(posting: &Posting) -> BTreeSet<Category> {
    if posting.has_specific_category() {
        return BTreeSet::new();
    }

    let mut found = categories_from_title(&posting.title);
    if found.is_empty() {
        found = categories_from_description(&posting.description);
    }
    if found.is_empty() && posting.is_early_career() {
        found.insert(Category::Generalist);
    }

    found.retain(|category| !posting.categories.contains(category));
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::posting;

    #[test]
    fn title_keywords_win_over_description() {
        let mut p = posting("Junior Financial Analyst", "Acme", "Paris, FR");
        p.description = "Work on marketing and brand campaigns".into();
        assert_eq!(backfill(&p), BTreeSet::from([Category::FinanceInvestment]));
    }

    #[test]
    fn description_needs_two_distinct_hits() {
        let mut p = posting("Graduate Programme 2026", "Acme", "Paris, FR");
        p.description = "You will support our sales team.".into();
        p.is_graduate_program = true;
        // One sales keyword only: generic fallback.
        assert_eq!(backfill(&p), BTreeSet::from([Category::Generalist]));

        p.description = "Support sales and business development with key clients.".into();
        assert_eq!(backfill(&p), BTreeSet::from([Category::SalesClient]));
    }

    #[test]
    fn multi_language_titles() {
        assert!(categories_from_title("Werkstudent Einkauf").contains(&Category::OperationsSupplyChain));
        assert!(categories_from_title("Stagiaire Contrôle de gestion - Finances").contains(&Category::FinanceInvestment));
        assert!(categories_from_title("Analista de Datos").contains(&Category::DataAnalytics));
    }

    #[test]
    fn postings_with_a_specific_category_are_left_alone() {
        let mut p = posting("Marketing Analyst", "Acme", "Paris, FR");
        p.categories.insert(Category::DataAnalytics);
        assert!(backfill(&p).is_empty());
    }

    #[test]
    fn non_early_career_without_keywords_gets_nothing() {
        let p = posting("Office Manager", "Acme", "Paris, FR");
        assert!(backfill(&p).is_empty());
    }
}
