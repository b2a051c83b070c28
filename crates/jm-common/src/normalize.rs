use sha2::{Digest, Sha256};
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

/// Length of the rendered content hash (hex chars, 128 bits).
pub const CONTENT_HASH_LEN: usize = 32;

/// Trim and collapse every run of whitespace (including full-width and
/// non-breaking spaces) into a single ASCII space.
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-cased, whitespace-collapsed form used as hash input.
pub fn hash_key(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Fold text for keyword matching: NFKD, combining marks stripped, a few
/// ligatures expanded, lower-cased, every non-alphanumeric run turned into a
/// single space.
///
/// `"  Münchën / Zürich-Süd "` → `"munchen zurich sud"`
pub fn fold(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut pending_space = false;

    for ch in value.nfkd().filter(|c| !is_combining_mark(*c)) {
        let expanded: &str = match ch {
            'ß' => "ss",
            'æ' | 'Æ' => "ae",
            'œ' | 'Œ' => "oe",
            'ø' | 'Ø' => "o",
            'ł' | 'Ł' => "l",
            'đ' | 'Đ' => "d",
            _ => "",
        };

        if !expanded.is_empty() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push_str(expanded);
            continue;
        }

        if ch.is_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// Whole-word containment on text already passed through [`fold`].
/// `term` must be folded too; multi-word terms match as a phrase.
pub fn contains_term(folded: &str, term: &str) -> bool {
    if term.is_empty() {
        return false;
    }
    folded.match_indices(term).any(|(start, _)| {
        let end = start + term.len();
        let before_ok = start == 0 || folded.as_bytes()[start - 1] == b' ';
        let after_ok = end == folded.len() || folded.as_bytes()[end] == b' ';
        before_ok && after_ok
    })
}

pub fn contains_any_term(folded: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| contains_term(folded, term))
}

/// Title-case each whitespace/hyphen separated word ("new york" → "New York").
pub fn title_case(value: &str) -> String {
    let collapsed = collapse_whitespace(value);
    let mut out = String::with_capacity(collapsed.len());
    let mut at_word_start = true;

    for ch in collapsed.chars() {
        if ch == ' ' || ch == '-' {
            out.push(ch);
            at_word_start = true;
        } else if at_word_start {
            out.extend(ch.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(ch.to_lowercase());
        }
    }

    out
}

/// Content identity of a posting.
///
/// SHA-256 over the lower-cased, whitespace-collapsed title, employer and
/// normalized location joined with `|`, truncated to [`CONTENT_HASH_LEN`]
/// hex chars. Two genuinely different openings with identical text collide
/// on purpose: the store treats them as one row.
pub fn content_hash(title: &str, employer: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(hash_key(title).as_bytes());
    hasher.update(b"|");
    hasher.update(hash_key(employer).as_bytes());
    hasher.update(b"|");
    hasher.update(hash_key(location).as_bytes());
    let bytes = hasher.finalize();
    let mut hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    hex.truncate(CONTENT_HASH_LEN);
    hex
}
