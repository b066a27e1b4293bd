//! Pattern matchers.
//!
//! Every matcher reports spans as inclusive char indices into the password.
//! Dictionary matching is literal (case-folded only): leet forms are not
//! undone here.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Shortest run reported by the sequence and repeat matchers.
const MIN_RUN: usize = 3;

const YEAR_MIN: u32 = 1900;
const YEAR_MAX: u32 = 2099;

/// Word → 1-based rank, lower is more common.
#[derive(Debug, Clone, Default)]
pub struct RankedDictionary {
    name: String,
    ranks: HashMap<String, usize>,
    longest: usize,
}

impl RankedDictionary {
    /// Ranks words by position. Words are lowercased and trimmed; the first
    /// occurrence of a duplicate keeps its rank.
    pub fn from_ordered<I, S>(name: impl Into<String>, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut ranks = HashMap::new();
        let mut longest = 0;
        let mut next_rank = 1;
        for word in words {
            let word = word.as_ref().trim().to_lowercase();
            if word.is_empty() || ranks.contains_key(&word) {
                continue;
            }
            longest = longest.max(word.chars().count());
            ranks.insert(word, next_rank);
            next_rank += 1;
        }
        Self {
            name: name.into(),
            ranks,
            longest,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rank(&self, word: &str) -> Option<usize> {
        self.ranks.get(word).copied()
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "pattern", rename_all = "snake_case")]
pub enum MatchKind {
    Dictionary {
        dictionary_name: String,
        matched_word: String,
        rank: usize,
        reversed: bool,
    },
    Sequence {
        sequence_name: String,
        ascending: bool,
    },
    Repeat {
        base_token: String,
        repeat_count: usize,
    },
    Year,
    Bruteforce,
}

/// A span of the password explained by one pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternMatch {
    pub i: usize,
    pub j: usize,
    pub token: String,
    #[serde(flatten)]
    pub kind: MatchKind,
    pub guesses: f64,
}

impl PatternMatch {
    pub(crate) fn new(chars: &[char], i: usize, j: usize, kind: MatchKind) -> Self {
        Self {
            i,
            j,
            token: chars[i..=j].iter().collect(),
            kind,
            guesses: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.j + 1 - self.i
    }

    pub fn is_bruteforce(&self) -> bool {
        matches!(self.kind, MatchKind::Bruteforce)
    }

    pub fn matched_word(&self) -> Option<&str> {
        match &self.kind {
            MatchKind::Dictionary { matched_word, .. } => Some(matched_word),
            _ => None,
        }
    }
}

/// All non-bruteforce matches, sorted by `(i, j)`.
pub fn omnimatch(chars: &[char], dictionaries: &[&RankedDictionary]) -> Vec<PatternMatch> {
    let mut matches = Vec::new();
    dictionary_matches(chars, dictionaries, &mut matches);
    reversed_dictionary_matches(chars, dictionaries, &mut matches);
    sequence_matches(chars, &mut matches);
    repeat_matches(chars, &mut matches);
    year_matches(chars, &mut matches);
    matches.sort_by_key(|m| (m.i, m.j));
    matches
}

fn dictionary_matches(chars: &[char], dictionaries: &[&RankedDictionary], out: &mut Vec<PatternMatch>) {
    let lowered: Vec<char> = chars.iter().map(|&c| fold_case(c)).collect();
    for dictionary in dictionaries {
        for i in 0..lowered.len() {
            let mut word = String::new();
            let last = (i + dictionary.longest).min(lowered.len());
            for j in i..last {
                word.push(lowered[j]);
                if let Some(rank) = dictionary.rank(&word) {
                    out.push(PatternMatch::new(
                        chars,
                        i,
                        j,
                        MatchKind::Dictionary {
                            dictionary_name: dictionary.name.clone(),
                            matched_word: word.clone(),
                            rank,
                            reversed: false,
                        },
                    ));
                }
            }
        }
    }
}

fn reversed_dictionary_matches(
    chars: &[char],
    dictionaries: &[&RankedDictionary],
    out: &mut Vec<PatternMatch>,
) {
    let reversed: Vec<char> = chars.iter().rev().copied().collect();
    let n = chars.len();
    let mut found = Vec::new();
    dictionary_matches(&reversed, dictionaries, &mut found);

    for m in found {
        // Palindromes are already covered by the forward pass.
        if m.token.chars().rev().eq(m.token.chars()) {
            continue;
        }
        let (i, j) = (n - 1 - m.j, n - 1 - m.i);
        let MatchKind::Dictionary {
            dictionary_name,
            matched_word,
            rank,
            ..
        } = m.kind
        else {
            continue;
        };
        out.push(PatternMatch::new(
            chars,
            i,
            j,
            MatchKind::Dictionary {
                dictionary_name,
                matched_word,
                rank,
                reversed: true,
            },
        ));
    }
}

fn sequence_matches(chars: &[char], out: &mut Vec<PatternMatch>) {
    let code = |k: usize| i64::from(u32::from(chars[k]));

    let mut i = 0;
    while i + 1 < chars.len() {
        let delta = code(i + 1) - code(i);
        if delta != 1 && delta != -1 {
            i += 1;
            continue;
        }

        let mut j = i + 1;
        while j + 1 < chars.len() && code(j + 1) - code(j) == delta {
            j += 1;
        }
        if j + 1 - i >= MIN_RUN {
            out.push(PatternMatch::new(
                chars,
                i,
                j,
                MatchKind::Sequence {
                    sequence_name: sequence_name(chars[i]).to_string(),
                    ascending: delta > 0,
                },
            ));
        }
        // The last char of a run may open the next one ("abcba").
        i = j;
    }
}

fn sequence_name(first: char) -> &'static str {
    if first.is_ascii_lowercase() {
        "lower"
    } else if first.is_ascii_uppercase() {
        "upper"
    } else if first.is_ascii_digit() {
        "digits"
    } else {
        "unicode"
    }
}

fn repeat_matches(chars: &[char], out: &mut Vec<PatternMatch>) {
    let mut i = 0;
    while i < chars.len() {
        let mut j = i;
        while j + 1 < chars.len() && chars[j + 1] == chars[i] {
            j += 1;
        }
        let count = j + 1 - i;
        if count >= MIN_RUN {
            out.push(PatternMatch::new(
                chars,
                i,
                j,
                MatchKind::Repeat {
                    base_token: chars[i].to_string(),
                    repeat_count: count,
                },
            ));
        }
        i = j + 1;
    }
}

fn year_matches(chars: &[char], out: &mut Vec<PatternMatch>) {
    if chars.len() < 4 {
        return;
    }
    for i in 0..=chars.len() - 4 {
        let window = &chars[i..i + 4];
        if !window.iter().all(char::is_ascii_digit) {
            continue;
        }
        let year = window
            .iter()
            .filter_map(|c| c.to_digit(10))
            .fold(0u32, |acc, d| acc * 10 + d);
        if (YEAR_MIN..=YEAR_MAX).contains(&year) {
            out.push(PatternMatch::new(chars, i, i + 3, MatchKind::Year));
        }
    }
}

fn fold_case(c: char) -> char {
    let mut lower = c.to_lowercase();
    match (lower.next(), lower.next()) {
        (Some(single), None) => single,
        _ => c,
    }
}
