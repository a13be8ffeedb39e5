//! Name rewriting used by the resolution cascade
//!
//! Everything here is pure string work. The remote datasets only support exact,
//! case-sensitive equality, so the cascade compensates by probing a handful of
//! rewritten forms of the input.

use crate::boundary::{Dataset, ProbeTarget};
use crate::utils;

/// Generic administrative suffixes removed before a second sweep
const ADMIN_SUFFIXES: [&str; 5] = ["city", "county", "district", "province", "state"];

/// Tokens this short are too unspecific for a partial match
const MIN_TOKEN_LEN: usize = 4;

/// A colloquial name and the dataset entry it stands for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Alias {
    pub target: ProbeTarget,
    pub canonical: &'static str,
}

const fn alias(dataset: Dataset, attribute: &'static str, level: u8, canonical: &'static str) -> Alias {
    Alias {
        target: ProbeTarget::name_of(dataset, attribute, level),
        canonical,
    }
}

/// Colloquial names keyed by their lower-cased, whitespace-collapsed form
static ALIASES: &[(&str, Alias)] = &[
    ("nyc", alias(Dataset::UsCounties, "NAME", 2, "New York")),
    ("new york city", alias(Dataset::UsCounties, "NAME", 2, "New York")),
    ("big apple", alias(Dataset::UsCounties, "NAME", 2, "New York")),
    ("la", alias(Dataset::UsCounties, "NAME", 2, "Los Angeles")),
    ("sf", alias(Dataset::UsCounties, "NAME", 2, "San Francisco")),
    ("silicon valley", alias(Dataset::UsCounties, "NAME", 2, "Santa Clara")),
    ("dc", alias(Dataset::UsStates, "NAME", 1, "District of Columbia")),
    ("washington dc", alias(Dataset::UsStates, "NAME", 1, "District of Columbia")),
    ("washington d.c.", alias(Dataset::UsStates, "NAME", 1, "District of Columbia")),
    ("usa", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "United States of America")),
    ("us", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "United States of America")),
    ("united states", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "United States of America")),
    ("uk", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "U.K. of Great Britain and Northern Ireland")),
    ("united kingdom", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "U.K. of Great Britain and Northern Ireland")),
    ("great britain", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "U.K. of Great Britain and Northern Ireland")),
    ("uae", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "United Arab Emirates")),
    ("holland", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "Netherlands")),
    ("russia", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "Russian Federation")),
    ("south korea", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "Republic of Korea")),
    ("vietnam", alias(Dataset::GaulLevel0, "ADM0_NAME", 0, "Viet Nam")),
];

/// Distinct casings tried by the exact-match sweep: raw, Title Case, UPPER CASE
pub fn casing_variants(name: &str) -> Vec<String> {
    let mut variants = Vec::with_capacity(3);
    for candidate in [name.to_string(), utils::title_case(name), name.to_uppercase()] {
        if !candidate.is_empty() && !variants.contains(&candidate) {
            variants.push(candidate);
        }
    }
    variants
}

/// Look up a colloquial name (case and whitespace insensitive)
pub fn lookup_alias(name: &str) -> Option<Alias> {
    let key = utils::collapse_whitespace(name).to_lowercase();
    ALIASES
        .iter()
        .find(|(colloquial, _)| *colloquial == key)
        .map(|(_, alias)| *alias)
}

/// Remove a trailing administrative suffix ("Kent County" → "Kent")
///
/// Returns `None` when there is no suffix or nothing would remain.
pub fn strip_admin_suffix(name: &str) -> Option<&str> {
    let name = name.trim();
    let (stem, last) = name.rsplit_once(char::is_whitespace)?;
    let stem = stem.trim_end();
    let is_suffix = ADMIN_SUFFIXES
        .iter()
        .any(|suffix| last.eq_ignore_ascii_case(suffix));
    (is_suffix && !stem.is_empty()).then_some(stem)
}

/// Significant tokens of a name, in order and without duplicates
pub fn significant_tokens(name: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for token in name.split(|c: char| c.is_whitespace() || c == '-') {
        if token.chars().count() >= MIN_TOKEN_LEN && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_casing_variants_dedup() {
        assert_eq!(casing_variants("paris"), vec!["paris", "Paris", "PARIS"]);
        assert_eq!(casing_variants("Paris"), vec!["Paris", "PARIS"]);
        assert_eq!(casing_variants("USA"), vec!["USA", "Usa"]);
        assert!(casing_variants("").is_empty());
    }

    #[test]
    fn test_alias_lookup() {
        let nyc = lookup_alias("  NYC ").unwrap();
        assert_eq!(nyc.canonical, "New York");
        assert_eq!(nyc.target.dataset, Dataset::UsCounties);
        assert_eq!(lookup_alias("Washington   DC").unwrap().target.level, 1);
        assert!(lookup_alias("Paris").is_none());
    }

    #[test]
    fn test_alias_targets_use_name_attributes() {
        for (_, alias) in ALIASES {
            assert_eq!(alias.target.attribute, alias.target.dataset.name_attribute());
            assert_eq!(alias.target.level, alias.target.dataset.admin_level());
        }
    }

    #[test]
    fn test_strip_admin_suffix() {
        assert_eq!(strip_admin_suffix("Kent County"), Some("Kent"));
        assert_eq!(strip_admin_suffix("Mexico CITY"), Some("Mexico"));
        assert_eq!(strip_admin_suffix("Hunan province"), Some("Hunan"));
        assert_eq!(strip_admin_suffix("County"), None);
        assert_eq!(strip_admin_suffix("Paris"), None);
        assert_eq!(strip_admin_suffix("Statesboro"), None);
    }

    #[test]
    fn test_significant_tokens() {
        assert_eq!(
            significant_tokens("Greater Manchester-upon-Irwell"),
            vec!["Greater", "Manchester", "upon", "Irwell"]
        );
        assert_eq!(significant_tokens("Rio de la Plata"), vec!["Plata"]);
        assert_eq!(significant_tokens("St. Ives"), vec!["Ives"]);
    }
}
