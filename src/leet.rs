//! Leetspeak substitution table.
//!
//! A single table drives both directions: plain letters expand to their
//! obfuscated surface forms, and surface-form tokens collapse back to plain
//! letters. Reverse tokens are kept sorted longest-first so that prefix
//! matching is greedy (maximal munch): `|_|` wins over `|_`, which wins
//! over `|`.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Canonical letter → surface forms, in preference order.
const STANDARD_FORMS: &[(char, &[&str])] = &[
    ('a', &["4", "@", "^", "λ"]),
    ('b', &["8", "|3", "ß"]),
    ('c', &["¢", "(", "<", "{"]),
    ('d', &["|)", "đ"]),
    ('e', &["3", "€", "&"]),
    ('f', &["ƒ", "|="]),
    ('g', &["6", "9"]),
    ('h', &["#", "|-|"]),
    ('i', &["1", "!", "|"]),
    ('j', &["_|"]),
    ('k', &["|<"]),
    ('l', &["1", "|_"]),
    ('m', &["\\/\\/\\", "|\\/|", "em"]),
    ('n', &["|\\|"]),
    ('o', &["0", "()"]),
    ('p', &["|*"]),
    ('q', &["9"]),
    ('r', &["|2", "®"]),
    ('s', &["5", "$"]),
    ('t', &["7", "+"]),
    ('u', &["|_|"]),
    ('v', &["\\/"]),
    ('w', &["\\/\\/", "\\^/", "\\|/", "vv"]),
    ('x', &["><"]),
    ('y', &["`/"]),
    ('z', &["2"]),
];

static STANDARD: LazyLock<SubstitutionTable> = LazyLock::new(|| {
    SubstitutionTable::from_forms(
        STANDARD_FORMS
            .iter()
            .map(|(letter, forms)| (*letter, forms.iter().copied())),
    )
});

/// Bidirectional mapping between canonical letters and their leet forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubstitutionTable {
    forward: BTreeMap<char, Vec<String>>,
    /// Surface token → every letter it can stand for. Longest token first.
    reverse: Vec<(String, Vec<char>)>,
}

impl SubstitutionTable {
    /// The process-wide table, built once on first use.
    pub fn standard() -> &'static SubstitutionTable {
        &STANDARD
    }

    /// Builds a table from `(letter, forms)` entries.
    ///
    /// Letters are lowercased. Empty forms and forms identical to their own
    /// letter are dropped, so a substitution always makes progress. A form
    /// listed under several letters (`1` for both `i` and `l`) yields one
    /// reverse entry that maps back to each of them.
    pub fn from_forms<'a, I, F>(entries: I) -> Self
    where
        I: IntoIterator<Item = (char, F)>,
        F: IntoIterator<Item = &'a str>,
    {
        let mut forward: BTreeMap<char, Vec<String>> = BTreeMap::new();
        let mut reverse: Vec<(String, Vec<char>)> = Vec::new();

        for (letter, forms) in entries {
            let letter = letter.to_lowercase().next().unwrap_or(letter);
            for form in forms {
                if form.is_empty() || is_self_mapping(letter, form) {
                    continue;
                }

                let slot = forward.entry(letter).or_default();
                if !slot.iter().any(|f| f == form) {
                    slot.push(form.to_string());
                }

                match reverse.iter_mut().find(|(token, _)| token.as_str() == form) {
                    Some((_, letters)) => {
                        if !letters.contains(&letter) {
                            letters.push(letter);
                        }
                    }
                    None => reverse.push((form.to_string(), vec![letter])),
                }
            }
        }

        // Stable sort: equal-length tokens keep table order.
        reverse.sort_by_key(|(token, _)| Reverse(token.chars().count()));

        Self { forward, reverse }
    }

    /// Obfuscation surface forms for `letter`, in preference order.
    ///
    /// Characters without an entry (digits, symbols, uppercase) return an
    /// empty slice.
    pub fn forms(&self, letter: char) -> &[String] {
        self.forward.get(&letter).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every surface token that prefixes `input`, longest first, with the
    /// letters it can be reduced to.
    pub fn matching_prefixes<'t>(
        &'t self,
        input: &'t str,
    ) -> impl Iterator<Item = (&'t str, &'t [char])> + 't {
        self.reverse
            .iter()
            .filter(move |(token, _)| input.starts_with(token.as_str()))
            .map(|(token, letters)| (token.as_str(), letters.as_slice()))
    }

    /// Longest surface token prefixing `input`.
    pub fn longest_prefix<'t>(&'t self, input: &'t str) -> Option<(&'t str, &'t [char])> {
        self.matching_prefixes(input).next()
    }

    /// Whether any surface token occurs anywhere in `input`.
    pub fn has_substitutions(&self, input: &str) -> bool {
        input
            .char_indices()
            .any(|(at, _)| self.longest_prefix(&input[at..]).is_some())
    }

    /// All surface tokens, longest first.
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        self.reverse.iter().map(|(token, _)| token.as_str())
    }

    /// Letters that have at least one surface form.
    pub fn letters(&self) -> impl Iterator<Item = char> + '_ {
        self.forward.keys().copied()
    }
}

fn is_self_mapping(letter: char, form: &str) -> bool {
    let mut chars = form.chars();
    chars.next() == Some(letter) && chars.next().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forms_keep_table_order() {
        let table = SubstitutionTable::standard();
        assert_eq!(table.forms('a'), ["4", "@", "^", "λ"]);
        assert_eq!(table.forms('w')[0], "\\/\\/");
        assert!(table.forms('7').is_empty());
        assert!(table.forms('A').is_empty());
    }

    #[test]
    fn test_longest_prefix_prefers_longer_token() {
        let table = SubstitutionTable::standard();

        let (token, letters) = table.longest_prefix("|_|ser").unwrap();
        assert_eq!(token, "|_|");
        assert_eq!(letters, ['u']);

        let (token, letters) = table.longest_prefix("|_x").unwrap();
        assert_eq!(token, "|_");
        assert_eq!(letters, ['l']);

        let (token, _) = table.longest_prefix("|x").unwrap();
        assert_eq!(token, "|");
    }

    #[test]
    fn test_matching_prefixes_are_sorted_longest_first() {
        let table = SubstitutionTable::standard();
        let tokens: Vec<&str> = table
            .matching_prefixes("\\/\\/\\")
            .map(|(token, _)| token)
            .collect();
        assert_eq!(tokens, ["\\/\\/\\", "\\/\\/", "\\/"]);
    }

    #[test]
    fn test_every_forward_form_has_reverse_entry() {
        let table = SubstitutionTable::standard();
        for letter in table.letters() {
            for form in table.forms(letter) {
                let (_, letters) = table
                    .matching_prefixes(form)
                    .find(|(token, _)| *token == form.as_str())
                    .unwrap_or_else(|| panic!("no reverse entry for {form:?}"));
                assert!(letters.contains(&letter), "{form:?} does not map back to {letter}");
            }
        }
    }

    #[test]
    fn test_shared_token_maps_to_every_letter() {
        let table = SubstitutionTable::standard();
        let (_, letters) = table.longest_prefix("1").unwrap();
        assert_eq!(letters, ['i', 'l']);
        let (_, letters) = table.longest_prefix("9").unwrap();
        assert_eq!(letters, ['g', 'q']);
    }

    #[test]
    fn test_self_mapping_is_dropped() {
        let table = SubstitutionTable::from_forms([('a', ["a", "4"]), ('B', ["b", "8"])]);
        assert_eq!(table.forms('a'), ["4"]);
        assert_eq!(table.forms('b'), ["8"]);
        assert!(table.longest_prefix("abc").is_none());
    }

    #[test]
    fn test_has_substitutions() {
        let table = SubstitutionTable::standard();
        assert!(!table.has_substitutions("hello"));
        assert!(table.has_substitutions("h3llo"));
        assert!(table.has_substitutions("remember"));
        assert!(!table.has_substitutions("summer"));
        assert!(!table.has_substitutions(""));
    }
}
