use std::collections::HashMap;

use lazy_static::lazy_static;
use once_cell::sync::Lazy;
use regex::Regex;
use strsim::damerau_levenshtein;

use crate::REMOTE_LOCATION;
use crate::normalize::{collapse_whitespace, fold, title_case};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownCity {
    pub name: &'static str,
    /// ISO 3166-1 alpha-2
    pub country: &'static str,
    pub aliases: &'static [&'static str],
}

const fn city(
    name: &'static str,
    country: &'static str,
    aliases: &'static [&'static str],
) -> KnownCity {
    KnownCity {
        name,
        country,
        aliases,
    }
}

/// Cities postings and profiles commonly mention, with local spellings.
pub static KNOWN_CITIES: &[KnownCity] = &[
    city("London", "GB", &["londres", "londra", "londen", "city of london"]),
    city("Manchester", "GB", &[]),
    city("Birmingham", "GB", &[]),
    city("Edinburgh", "GB", &[]),
    city("Glasgow", "GB", &[]),
    city("Bristol", "GB", &[]),
    city("Leeds", "GB", &[]),
    city("Dublin", "IE", &["baile atha cliath"]),
    city("Paris", "FR", &["parigi", "la defense"]),
    city("Lyon", "FR", &["lyons", "lione"]),
    city("Marseille", "FR", &["marseilles", "marsiglia"]),
    city("Toulouse", "FR", &[]),
    city("Berlin", "DE", &["berlino"]),
    city("Munich", "DE", &["munchen", "muenchen", "monaco di baviera", "munique"]),
    city("Hamburg", "DE", &["hambourg", "amburgo"]),
    city("Frankfurt", "DE", &["frankfurt am main", "francfort", "francoforte"]),
    city("Cologne", "DE", &["koln", "koeln", "colonia"]),
    city("Dusseldorf", "DE", &["duesseldorf"]),
    city("Stuttgart", "DE", &[]),
    city("Amsterdam", "NL", &[]),
    city("Rotterdam", "NL", &[]),
    city("Utrecht", "NL", &[]),
    city("The Hague", "NL", &["den haag", "s gravenhage", "la haye", "la haya"]),
    city("Brussels", "BE", &["bruxelles", "brussel", "bruselas", "bruxelas"]),
    city("Antwerp", "BE", &["antwerpen", "anvers"]),
    city("Madrid", "ES", &[]),
    city("Barcelona", "ES", &["barcelone"]),
    city("Valencia", "ES", &["valence"]),
    city("Milan", "IT", &["milano", "milao"]),
    city("Rome", "IT", &["roma"]),
    city("Turin", "IT", &["torino"]),
    city("Zurich", "CH", &["zuerich", "zurigo"]),
    city("Geneva", "CH", &["geneve", "genf", "ginevra", "ginebra"]),
    city("Basel", "CH", &["bale", "basilea"]),
    city("Vienna", "AT", &["wien", "vienne"]),
    city("Copenhagen", "DK", &["kobenhavn", "copenhague"]),
    city("Stockholm", "SE", &["estocolmo", "stoccolma"]),
    city("Oslo", "NO", &[]),
    city("Helsinki", "FI", &["helsingfors"]),
    city("Lisbon", "PT", &["lisboa", "lisbonne", "lisbona"]),
    city("Porto", "PT", &["oporto"]),
    city("Warsaw", "PL", &["warszawa", "varsovie", "varsavia"]),
    city("Krakow", "PL", &["cracow", "cracovie"]),
    city("Prague", "CZ", &["praha", "prag", "praga"]),
    city("Budapest", "HU", &[]),
    city("Athens", "GR", &["athina", "athenes", "atene"]),
    city("Luxembourg", "LU", &["luxemburg", "lussemburgo"]),
    city("New York", "US", &["nyc", "new york city", "manhattan"]),
    city("Singapore", "SG", &["singapour"]),
];

lazy_static! {
    /// Folded country name / alias → ISO 3166-1 alpha-2
    pub static ref COUNTRY_ALIASES: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("united kingdom", "GB"); m.insert("uk", "GB"); m.insert("great britain", "GB");
        m.insert("britain", "GB"); m.insert("england", "GB"); m.insert("scotland", "GB");
        m.insert("wales", "GB"); m.insert("royaume uni", "GB"); m.insert("vereinigtes konigreich", "GB");
        m.insert("ireland", "IE"); m.insert("eire", "IE"); m.insert("irlande", "IE");
        m.insert("france", "FR"); m.insert("frankreich", "FR"); m.insert("francia", "FR");
        m.insert("germany", "DE"); m.insert("deutschland", "DE"); m.insert("allemagne", "DE");
        m.insert("alemania", "DE"); m.insert("germania", "DE");
        m.insert("netherlands", "NL"); m.insert("the netherlands", "NL"); m.insert("nederland", "NL");
        m.insert("holland", "NL"); m.insert("pays bas", "NL"); m.insert("niederlande", "NL");
        m.insert("belgium", "BE"); m.insert("belgique", "BE"); m.insert("belgie", "BE");
        m.insert("belgien", "BE");
        m.insert("spain", "ES"); m.insert("espana", "ES"); m.insert("espagne", "ES");
        m.insert("spanien", "ES");
        m.insert("italy", "IT"); m.insert("italia", "IT"); m.insert("italie", "IT");
        m.insert("italien", "IT");
        m.insert("switzerland", "CH"); m.insert("schweiz", "CH"); m.insert("suisse", "CH");
        m.insert("svizzera", "CH");
        m.insert("austria", "AT"); m.insert("osterreich", "AT"); m.insert("oesterreich", "AT");
        m.insert("autriche", "AT");
        m.insert("denmark", "DK"); m.insert("danmark", "DK"); m.insert("danemark", "DK");
        m.insert("sweden", "SE"); m.insert("sverige", "SE"); m.insert("suede", "SE");
        m.insert("norway", "NO"); m.insert("norge", "NO"); m.insert("norvege", "NO");
        m.insert("finland", "FI"); m.insert("suomi", "FI");
        m.insert("portugal", "PT");
        m.insert("poland", "PL"); m.insert("polska", "PL"); m.insert("pologne", "PL");
        m.insert("czech republic", "CZ"); m.insert("czechia", "CZ"); m.insert("cesko", "CZ");
        m.insert("hungary", "HU"); m.insert("magyarorszag", "HU");
        m.insert("greece", "GR"); m.insert("ellada", "GR");
        m.insert("luxembourg", "LU"); m.insert("luxemburg", "LU");
        m.insert("united states", "US"); m.insert("united states of america", "US");
        m.insert("usa", "US"); m.insert("us", "US");
        m.insert("singapore", "SG");
        m
    };

    /// Folded spelling (canonical or alias) → city entry
    static ref CITY_INDEX: HashMap<String, &'static KnownCity> = {
        let mut m = HashMap::new();
        for known in KNOWN_CITIES {
            m.insert(fold(known.name), known);
            for alias in known.aliases {
                m.entry(fold(alias)).or_insert(known);
            }
        }
        m
    };
}

/// Folded location texts that mean "no fixed office".
const REMOTE_MARKERS: &[&str] = &[
    "remote",
    "fully remote",
    "100 remote",
    "remote first",
    "work from home",
    "wfh",
    "anywhere",
    "teletravail",
    "teletravail complet",
    "homeoffice",
    "home office",
    "remoto",
    "da remoto",
    "en remoto",
    "thuiswerken",
];

static PARENTHESIZED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\([^)]*\)|\[[^\]]*\]").expect("valid parenthesized regex"));

/// True when the location text denotes a remote position rather than a city.
pub fn is_remote_marker(raw: &str) -> bool {
    let folded = fold(raw);
    if folded.is_empty() {
        return false;
    }
    REMOTE_MARKERS.iter().any(|marker| {
        folded == *marker
            || folded
                .strip_prefix(marker)
                .is_some_and(|rest| rest.starts_with(' '))
    })
}

/// Resolve a country name or alias to ISO alpha-2.
pub fn resolve_country(raw: &str) -> Option<&'static str> {
    let folded = fold(raw);
    COUNTRY_ALIASES.get(folded.as_str()).copied()
}

fn two_letter_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
        Some(trimmed.to_ascii_uppercase())
    } else {
        None
    }
}

/// Find the known city a spelling refers to: exact folded/alias match
/// first, then a small edit-distance fallback for longer names.
pub fn lookup_city(raw: &str) -> Option<&'static KnownCity> {
    let folded = fold(raw);
    if folded.is_empty() {
        return None;
    }
    if let Some(known) = CITY_INDEX.get(folded.as_str()) {
        return Some(known);
    }
    fuzzy_city(&folded)
}

/// Walks `KNOWN_CITIES` in table order, so of two equally close cities the
/// earlier entry wins.
fn fuzzy_city(folded: &str) -> Option<&'static KnownCity> {
    if folded.len() < 6 {
        return None;
    }

    let spellings = KNOWN_CITIES.iter().flat_map(|known| {
        std::iter::once(known.name)
            .chain(known.aliases.iter().copied())
            .map(move |spelling| (fold(spelling), known))
    });

    let mut best: Option<(&'static KnownCity, usize)> = None;
    for (spelling, known) in spellings {
        if spelling.len() < 6 {
            continue;
        }
        let distance = damerau_levenshtein(folded, &spelling);
        let len = folded.len().max(spelling.len());
        let acceptable = distance == 1 || (len >= 9 && distance == 2);
        if !acceptable {
            continue;
        }
        match best {
            None => best = Some((known, distance)),
            Some((_, best_dist)) if distance < best_dist => best = Some((known, distance)),
            _ => {}
        }
    }

    best.map(|(known, _)| known)
}

/// Normalize a raw location into `City, CC`, `City` or `remote`.
///
/// The first comma-separated part is the city, the last (when there is more
/// than one) the country. Parenthesized notes are dropped. Unknown cities are
/// title-cased; an unresolvable country is dropped unless it already is a
/// two-letter code, in which case the known city's own country fills in.
pub fn normalize_location(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    if collapsed.is_empty() {
        return String::new();
    }
    if is_remote_marker(&collapsed) {
        return REMOTE_LOCATION.to_string();
    }

    let stripped = PARENTHESIZED.replace_all(&collapsed, " ");
    let parts: Vec<&str> = stripped
        .split([',', '/', '|'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();

    let Some(city_part) = parts.first() else {
        // Nothing but a parenthesized note.
        return collapsed;
    };
    if is_remote_marker(city_part) {
        return REMOTE_LOCATION.to_string();
    }

    let known = lookup_city(city_part);
    let city_name = known
        .map(|k| k.name.to_string())
        .unwrap_or_else(|| title_case(city_part));

    let given_country = if parts.len() > 1 {
        parts.last().and_then(|country_part| {
            resolve_country(country_part)
                .map(str::to_string)
                .or_else(|| two_letter_code(country_part))
        })
    } else {
        None
    };
    let country = given_country.or_else(|| known.map(|k| k.country.to_string()));

    match country {
        Some(code) => format!("{city_name}, {code}"),
        None => city_name,
    }
}

/// Comparison key for a city: the known canonical name when resolvable,
/// otherwise the folded text of the first comma-separated part.
pub fn city_key(raw: &str) -> String {
    let first = raw.split(',').next().unwrap_or("");
    match lookup_city(first) {
        Some(known) => fold(known.name),
        None => fold(first),
    }
}

/// Whether a posting's normalized city and a user's target city refer to
/// the same place, tolerating case, diacritics and known local spellings.
pub fn same_city(posting_city: &str, target_city: &str) -> bool {
    let left = city_key(posting_city);
    !left.is_empty() && left == city_key(target_city)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_markers_collapse_to_remote() {
        assert_eq!(normalize_location("Remote"), "remote");
        assert_eq!(normalize_location("  Fully Remote "), "remote");
        assert_eq!(normalize_location("Télétravail"), "remote");
        assert_eq!(normalize_location("Remote (EU)"), "remote");
        assert_eq!(normalize_location("remote - europe"), "remote");
        assert!(!is_remote_marker("Remoteville"));
    }

    #[test]
    fn known_cities_gain_country_codes() {
        assert_eq!(normalize_location("london"), "London, GB");
        assert_eq!(normalize_location("London, United Kingdom"), "London, GB");
        assert_eq!(normalize_location("München, Deutschland"), "Munich, DE");
        assert_eq!(normalize_location("Bruxelles (hybrid)"), "Brussels, BE");
        assert_eq!(normalize_location("London, England, UK"), "London, GB");
    }

    #[test]
    fn unknown_cities_are_title_cased() {
        assert_eq!(normalize_location("aix-en-provence, France"), "Aix-En-Provence, FR");
        assert_eq!(normalize_location("springfield, XY"), "Springfield, XY");
        assert_eq!(normalize_location("Springfield, Atlantis"), "Springfield");
        assert_eq!(normalize_location("   "), "");
    }

    #[test]
    fn city_typos_resolve_for_long_names() {
        assert_eq!(lookup_city("Amsterdm").map(|c| c.name), Some("Amsterdam"));
        assert_eq!(lookup_city("Copenhagan").map(|c| c.name), Some("Copenhagen"));
        // Short names never fuzz.
        assert_eq!(lookup_city("Osla"), None);
    }

    #[test]
    fn equally_close_typos_resolve_to_the_earlier_city() {
        // One edit from both Munich and Zurich.
        for _ in 0..20 {
            assert_eq!(lookup_city("Murich").map(|c| c.name), Some("Munich"));
        }
        assert_eq!(normalize_location("Murich, Germany"), "Munich, DE");
    }

    #[test]
    fn same_city_accepts_variants() {
        assert!(same_city("Munich", "München"));
        assert!(same_city("London", "london, uk"));
        assert!(same_city("The Hague", "Den Haag"));
        assert!(!same_city("Paris", "Lyon"));
        assert!(!same_city("", ""));
    }
}
