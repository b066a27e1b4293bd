//! Personal information leakage.
//!
//! Identity fields are expanded into a term set (tokens, date reorderings,
//! location acronyms). A password leaks PII when any substring of at least
//! two characters of any of its normalized variants is in that set.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::leet::SubstitutionTable;
use crate::variants::{self, NormalizeLimits};

const MIN_SUBSTRING_LEN: usize = 2;
const DATE_SEPARATORS: [char; 3] = ['-', '/', ' '];

/// How an identity field's value is expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Date,
    Location,
    FreeText,
}

impl FieldKind {
    /// Classifies a field by its name, ignoring case, `_` and `-`.
    pub fn classify(key: &str) -> Self {
        let key: String = key
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();
        match key.as_str() {
            "birthday" | "dateofbirth" | "dob" | "birthdate" => FieldKind::Date,
            "countryfull" | "country" | "location" | "city" | "state" => FieldKind::Location,
            _ => FieldKind::FreeText,
        }
    }
}

/// Normalized, deduplicated identity terms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PiiTermSet {
    terms: BTreeSet<String>,
    longest: usize,
}

impl PiiTermSet {
    pub fn contains(&self, term: &str) -> bool {
        self.terms.contains(term)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.terms.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn insert(&mut self, term: impl Into<String>) {
        let term = term.into();
        if term.is_empty() {
            return;
        }
        self.longest = self.longest.max(term.chars().count());
        self.terms.insert(term);
    }
}

impl<S: Into<String>> FromIterator<S> for PiiTermSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = PiiTermSet::default();
        for term in iter {
            set.insert(term.into().to_lowercase());
        }
        set
    }
}

/// Expands identity fields into a term set.
///
/// Values that are empty or `none` (any case) are skipped.
pub fn build_term_set<I, K, V>(fields: I) -> PiiTermSet
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut set = PiiTermSet::default();
    for (key, value) in fields {
        let value = value.as_ref().trim().to_lowercase();
        if value.is_empty() || value == "none" {
            continue;
        }
        match FieldKind::classify(key.as_ref()) {
            FieldKind::Date => expand_date(&value, &mut set),
            FieldKind::Location => expand_location(&value, &mut set),
            FieldKind::FreeText => expand_free_text(&value, &mut set),
        }
    }
    set
}

fn expand_free_text(value: &str, set: &mut PiiTermSet) {
    let tokens: Vec<&str> = value.split_whitespace().collect();
    for token in &tokens {
        set.insert(*token);
    }
    set.insert(tokens.join(" "));
    if tokens.len() > 1 {
        set.insert(tokens.concat());
    }
}

fn expand_location(value: &str, set: &mut PiiTermSet) {
    let words: Vec<&str> = value.split_whitespace().collect();
    for word in &words {
        set.insert(*word);
    }
    let acronym: String = words.iter().filter_map(|w| w.chars().next()).collect();
    set.insert(acronym);
}

fn expand_date(value: &str, set: &mut PiiTermSet) {
    let Some(sep) = DATE_SEPARATORS.into_iter().find(|&sep| value.contains(sep)) else {
        set.insert(value);
        return;
    };

    for component in value.split(sep) {
        set.insert(component);
    }
    set.insert(value.replace(sep, ""));

    let format = format!("%m{sep}%d{sep}%Y");
    if let Ok(date) = NaiveDate::parse_from_str(value, &format) {
        set.insert(date.format("%Y%m%d").to_string());
        set.insert(date.format("%d%m%Y").to_string());
    }
}

/// Terms found in a password, with the work it took.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PiiMatches {
    pub matched_terms: BTreeSet<String>,
    pub variants_checked: usize,
    pub substrings_checked: usize,
    pub truncated: bool,
}

/// Terms of `terms` contained in `password` or one of its normalized variants.
pub fn match_against_password(
    password: &str,
    terms: &PiiTermSet,
) -> Result<BTreeSet<String>, InputError> {
    match_with_limits(password, terms, NormalizeLimits::default()).map(|m| m.matched_terms)
}

/// [`match_against_password`] with explicit variant limits and work counters.
pub fn match_with_limits(
    password: &str,
    terms: &PiiTermSet,
    limits: NormalizeLimits,
) -> Result<PiiMatches, InputError> {
    if password.is_empty() {
        return Err(InputError::EmptyPassword);
    }

    let lowered = password.to_lowercase();
    let normalized = variants::normalize_with(&lowered, SubstitutionTable::standard(), limits);
    let mut matches = PiiMatches {
        truncated: normalized.is_truncated(),
        ..PiiMatches::default()
    };
    if terms.is_empty() {
        return Ok(matches);
    }

    for variant in normalized.iter() {
        matches.variants_checked += 1;
        let bounds: Vec<usize> = variant
            .char_indices()
            .map(|(at, _)| at)
            .chain(std::iter::once(variant.len()))
            .collect();

        for start in 0..bounds.len() {
            let longest_end = (start + terms.longest).min(bounds.len() - 1);
            for end in (start + MIN_SUBSTRING_LEN)..=longest_end {
                matches.substrings_checked += 1;
                let candidate = &variant[bounds[start]..bounds[end]];
                if terms.contains(candidate) {
                    matches.matched_terms.insert(candidate.to_string());
                }
            }
        }
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(
        "PII scan: {} variants, {} substrings, {} matches",
        matches.variants_checked,
        matches.substrings_checked,
        matches.matched_terms.len()
    );

    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn terms_of(fields: &[(&str, &str)]) -> PiiTermSet {
        build_term_set(fields.iter().copied())
    }

    #[test]
    fn test_classify() {
        assert_eq!(FieldKind::classify("Birthday"), FieldKind::Date);
        assert_eq!(FieldKind::classify("date_of_birth"), FieldKind::Date);
        assert_eq!(FieldKind::classify("DOB"), FieldKind::Date);
        assert_eq!(FieldKind::classify("CountryFull"), FieldKind::Location);
        assert_eq!(FieldKind::classify("city"), FieldKind::Location);
        assert_eq!(FieldKind::classify("GivenName"), FieldKind::FreeText);
    }

    #[test]
    fn test_birthday_expansion() {
        let set = terms_of(&[("Birthday", "05-12-1998")]);
        for expected in ["05", "12", "1998", "05121998", "19980512", "12051998"] {
            assert!(set.contains(expected), "missing {expected}");
        }
        assert_eq!(set.len(), 6);
    }

    #[test]
    fn test_unparseable_date_keeps_raw_tokens() {
        let set = terms_of(&[("Birthday", "31/31/1998")]);
        assert!(set.contains("31"));
        assert!(set.contains("1998"));
        assert!(set.contains("31311998"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_date_without_separator_is_kept_whole() {
        let set = terms_of(&[("dob", "19980512")]);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec!["19980512"]);
    }

    #[test]
    fn test_date_uses_first_separator_found() {
        let set = terms_of(&[("Birthday", "05/12/1998 x")]);
        assert!(set.contains("05"));
        assert!(set.contains("1998 x"));
        assert!(!set.contains("x"));
    }

    #[test]
    fn test_location_words_and_acronym() {
        let set = terms_of(&[("CountryFull", "United  States")]);
        assert!(set.contains("united"));
        assert!(set.contains("states"));
        assert!(set.contains("us"));
    }

    #[test]
    fn test_free_text_tokens_and_full_value() {
        let set = terms_of(&[("Company", "  Acme   Rocket Works ")]);
        assert!(set.contains("acme"));
        assert!(set.contains("works"));
        assert!(set.contains("acme rocket works"));
        assert!(set.contains("acmerocketworks"));
    }

    #[test]
    fn test_empty_and_none_values_are_skipped() {
        let set = terms_of(&[("GivenName", ""), ("Surname", "None"), ("City", "   ")]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_leet_password_matches_name() {
        let mut fields = BTreeMap::new();
        fields.insert("GivenName".to_string(), "Onkar".to_string());
        let set = build_term_set(&fields);

        let matched = match_against_password("0nk4r123", &set).unwrap();
        assert!(matched.contains("onkar"));
    }

    #[test]
    fn test_birthday_found_inside_password() {
        let set = terms_of(&[("Birthday", "05-12-1998")]);
        let matched = match_against_password("Tiger19980512", &set).unwrap();
        assert!(matched.contains("19980512"));
        assert!(matched.contains("1998"));
        assert!(matched.contains("12"));
    }

    #[test]
    fn test_no_match() {
        let set = terms_of(&[("GivenName", "Onkar")]);
        let matched = match_against_password("Quartz-Vellum", &set).unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn test_single_char_terms_never_match() {
        let set: PiiTermSet = ["q"].into_iter().collect();
        let matched = match_against_password("qqq", &set).unwrap();
        assert!(matched.is_empty());
    }

    #[test]
    fn test_empty_password_is_rejected() {
        let set = terms_of(&[("GivenName", "Onkar")]);
        assert_eq!(match_against_password("", &set), Err(InputError::EmptyPassword));
    }

    #[test]
    fn test_multibyte_password_is_sliced_on_char_boundaries() {
        let set: PiiTermSet = ["λé"].into_iter().collect();
        let matched = match_against_password("xλéy", &set).unwrap();
        assert!(matched.contains("λé"));
    }
}
