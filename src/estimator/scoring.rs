//! Guess estimation and optimal decomposition.

use std::collections::BTreeMap;

use super::matching::{MatchKind, PatternMatch};

const BRUTEFORCE_CARDINALITY: f64 = 10.0;
const MIN_SUBMATCH_GUESSES_SINGLE_CHAR: f64 = 10.0;
const MIN_SUBMATCH_GUESSES_MULTI_CHAR: f64 = 50.0;
const MIN_BRUTEFORCE_GUESSES_SINGLE_CHAR: f64 = 11.0;
const MIN_BRUTEFORCE_GUESSES_MULTI_CHAR: f64 = 51.0;
const MIN_YEAR_SPACE: f64 = 20.0;
/// Additive cost of every pattern beyond the first.
const EXTRA_PATTERN_PENALTY: f64 = 10_000.0;

/// Score thresholds on guesses, score 0 below the first.
const SCORE_THRESHOLDS: [f64; 4] = [1e3 + 5.0, 1e6 + 5.0, 1e8 + 5.0, 1e10 + 5.0];

pub fn score_from_guesses(guesses: f64) -> u8 {
    SCORE_THRESHOLDS
        .iter()
        .take_while(|&&threshold| guesses >= threshold)
        .count() as u8
}

/// The cheapest explanation of a password.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    pub guesses: f64,
    pub sequence: Vec<PatternMatch>,
}

/// Fills in `m.guesses`, raising submatches to the per-length minimum.
pub fn estimate_guesses(m: &mut PatternMatch, password_len: usize, reference_year: i32) {
    let min_guesses = if m.len() < password_len {
        if m.len() == 1 {
            MIN_SUBMATCH_GUESSES_SINGLE_CHAR
        } else {
            MIN_SUBMATCH_GUESSES_MULTI_CHAR
        }
    } else {
        1.0
    };

    let raw = match &m.kind {
        MatchKind::Bruteforce => bruteforce_guesses(m.len()),
        MatchKind::Dictionary { rank, reversed, .. } => {
            let reversal = if *reversed { 2.0 } else { 1.0 };
            *rank as f64 * uppercase_variations(&m.token) * reversal
        }
        MatchKind::Sequence { ascending, .. } => sequence_guesses(&m.token, *ascending),
        MatchKind::Repeat {
            base_token,
            repeat_count,
        } => {
            let base = base_token.chars().next().map_or(1.0, char_cardinality);
            base * *repeat_count as f64
        }
        MatchKind::Year => {
            let year: i32 = m.token.parse().unwrap_or(reference_year);
            f64::from((year - reference_year).abs()).max(MIN_YEAR_SPACE)
        }
    };

    m.guesses = raw.max(min_guesses);
}

fn bruteforce_guesses(len: usize) -> f64 {
    let guesses = BRUTEFORCE_CARDINALITY.powi(len.min(i32::MAX as usize) as i32);
    let min = if len == 1 {
        MIN_BRUTEFORCE_GUESSES_SINGLE_CHAR
    } else {
        MIN_BRUTEFORCE_GUESSES_MULTI_CHAR
    };
    guesses.max(min)
}

fn sequence_guesses(token: &str, ascending: bool) -> f64 {
    let first = token.chars().next().unwrap_or_default();
    let mut base = if matches!(first, 'a' | 'A' | 'z' | 'Z' | '0' | '1' | '9') {
        4.0
    } else if first.is_ascii_digit() {
        10.0
    } else {
        26.0
    };
    if !ascending {
        base *= 2.0;
    }
    base * token.chars().count() as f64
}

fn char_cardinality(c: char) -> f64 {
    if c.is_ascii_digit() {
        10.0
    } else if c.is_ascii_alphabetic() {
        26.0
    } else {
        33.0
    }
}

/// How many capitalizations an attacker tries for this token.
pub fn uppercase_variations(token: &str) -> f64 {
    let chars: Vec<char> = token.chars().collect();
    let upper = chars.iter().filter(|c| c.is_uppercase()).count();
    if upper == 0 {
        return 1.0;
    }
    let lower = chars.iter().filter(|c| c.is_lowercase()).count();

    let first_only = upper == 1 && chars.first().is_some_and(|c| c.is_uppercase());
    let last_only = upper == 1 && chars.last().is_some_and(|c| c.is_uppercase());
    if first_only || last_only || lower == 0 {
        return 2.0;
    }

    (1..=upper.min(lower))
        .map(|k| n_choose_k(upper + lower, k))
        .sum()
}

fn n_choose_k(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    (1..=k).fold(1.0, |acc, d| acc * (n + 1 - d) as f64 / d as f64)
}

fn factorial(n: usize) -> f64 {
    (2..=n).fold(1.0, |acc, d| acc * d as f64)
}

#[derive(Debug, Clone)]
struct Step {
    m: PatternMatch,
    pi: f64,
    g: f64,
}

/// Covers the password with a sequence of matches minimizing
/// `l! · Π guesses + 10000^(l-1)`, filling gaps with bruteforce.
///
/// Bruteforce spans never follow each other; a longer span is always the
/// cheaper choice.
pub fn most_guessable_sequence(
    chars: &[char],
    matches: Vec<PatternMatch>,
    reference_year: i32,
) -> Decomposition {
    let n = chars.len();
    if n == 0 {
        return Decomposition {
            guesses: 1.0,
            sequence: Vec::new(),
        };
    }

    let mut by_end: Vec<Vec<PatternMatch>> = vec![Vec::new(); n];
    for mut m in matches {
        estimate_guesses(&mut m, n, reference_year);
        by_end[m.j].push(m);
    }

    // best[k][l]: cheapest sequence of l matches covering chars[..=k]
    let mut best: Vec<BTreeMap<usize, Step>> = vec![BTreeMap::new(); n];

    for k in 0..n {
        for m in &by_end[k] {
            if m.i == 0 {
                consider(&mut best[k], m, 1, m.guesses);
                continue;
            }
            let prior: Vec<(usize, f64)> = best[m.i - 1].iter().map(|(&l, s)| (l, s.pi)).collect();
            for (l, pi) in prior {
                consider(&mut best[k], m, l + 1, pi * m.guesses);
            }
        }

        let whole = bruteforce_match(chars, 0, k, n, reference_year);
        consider(&mut best[k], &whole, 1, whole.guesses);
        for i in 1..=k {
            let prior: Vec<(usize, f64)> = best[i - 1]
                .iter()
                .filter(|(_, s)| !s.m.is_bruteforce())
                .map(|(&l, s)| (l, s.pi))
                .collect();
            if prior.is_empty() {
                continue;
            }
            let tail = bruteforce_match(chars, i, k, n, reference_year);
            for (l, pi) in prior {
                consider(&mut best[k], &tail, l + 1, pi * tail.guesses);
            }
        }
    }

    let Some((&length, last)) = best[n - 1].iter().min_by(|a, b| a.1.g.total_cmp(&b.1.g)) else {
        return Decomposition {
            guesses: bruteforce_guesses(n),
            sequence: vec![bruteforce_match(chars, 0, n - 1, n, reference_year)],
        };
    };
    let guesses = last.g;

    let mut sequence = Vec::with_capacity(length);
    let mut k = n - 1;
    let mut l = length;
    while let Some(step) = best[k].get(&l) {
        sequence.push(step.m.clone());
        if step.m.i == 0 || l == 1 {
            break;
        }
        k = step.m.i - 1;
        l -= 1;
    }
    sequence.reverse();

    Decomposition { guesses, sequence }
}

fn bruteforce_match(chars: &[char], i: usize, j: usize, n: usize, reference_year: i32) -> PatternMatch {
    let mut m = PatternMatch::new(chars, i, j, MatchKind::Bruteforce);
    estimate_guesses(&mut m, n, reference_year);
    m
}

fn consider(entries: &mut BTreeMap<usize, Step>, m: &PatternMatch, l: usize, pi: f64) {
    let g = factorial(l) * pi + EXTRA_PATTERN_PENALTY.powi(l as i32 - 1);
    // A shorter (or equal) sequence that is no more expensive wins.
    if entries.range(..=l).any(|(_, step)| step.g <= g) {
        return;
    }
    entries.insert(l, Step { m: m.clone(), pi, g });
}
