//! Pattern-based guess estimator.
//!
//! Explains a password as the cheapest sequence of patterns (ranked
//! dictionary words, reversed words, sequences, repeats, years) with
//! bruteforce filling the gaps, and scores it 0–4 from the resulting guess
//! count. Dictionary lookups are literal: `summ3r` is not `summer` here.
//! Leet forms are unfolded upstream by the variant generator, which is what
//! makes a weaker normalized variant observable at all.

mod common;
mod feedback;
mod matching;
mod scoring;

pub use feedback::{Feedback, BANNED_WORDS, USER_INPUTS};
pub use matching::{MatchKind, PatternMatch, RankedDictionary};
pub use scoring::{score_from_guesses, uppercase_variations};

use std::sync::LazyLock;

use chrono::Datelike;
use serde::{Deserialize, Serialize};

/// Characters past this point are not analyzed.
pub const MAX_ESTIMATE_CHARS: usize = 100;

static STANDARD: LazyLock<Estimator> = LazyLock::new(Estimator::new);

/// Result of estimating one password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate {
    /// 0 (trivial) to 4 (very unguessable).
    pub score: u8,
    pub guesses: f64,
    pub guesses_log10: f64,
    pub sequence: Vec<PatternMatch>,
    pub feedback: Feedback,
}

impl Estimate {
    /// Dictionary matches in the chosen decomposition.
    pub fn dictionary_matches(&self) -> impl Iterator<Item = &PatternMatch> {
        self.sequence
            .iter()
            .filter(|m| matches!(m.kind, MatchKind::Dictionary { .. }))
    }
}

/// Estimator with its built-in dictionaries.
#[derive(Debug, Clone)]
pub struct Estimator {
    dictionaries: Vec<RankedDictionary>,
}

impl Default for Estimator {
    fn default() -> Self {
        Self::new()
    }
}

impl Estimator {
    pub fn new() -> Self {
        Self {
            dictionaries: vec![RankedDictionary::from_ordered(
                "passwords",
                common::COMMON_PASSWORDS.iter().copied(),
            )],
        }
    }

    /// Shared instance with the built-in dictionaries only.
    pub fn standard() -> &'static Estimator {
        &STANDARD
    }

    pub fn with_dictionary(mut self, dictionary: RankedDictionary) -> Self {
        self.dictionaries.push(dictionary);
        self
    }

    /// Rank of `word` in the built-in common password list, ignoring case.
    pub fn common_rank(&self, word: &str) -> Option<usize> {
        self.dictionaries.first()?.rank(&word.to_lowercase())
    }

    /// Estimates `password`, ranking `user_inputs` by position as an extra
    /// dictionary.
    pub fn estimate(&self, password: &str, user_inputs: &[&str]) -> Estimate {
        let inputs = RankedDictionary::from_ordered(USER_INPUTS, user_inputs.iter().copied());
        self.estimate_with(password, &[&inputs])
    }

    /// Estimates `password` against the built-in dictionaries plus `extra`.
    ///
    /// Prefer this over [`Estimator::estimate`] when the same extra terms are
    /// used for many passwords: the dictionaries are built once by the caller.
    pub fn estimate_with(&self, password: &str, extra: &[&RankedDictionary]) -> Estimate {
        let chars: Vec<char> = password.chars().take(MAX_ESTIMATE_CHARS).collect();
        let dictionaries: Vec<&RankedDictionary> = self
            .dictionaries
            .iter()
            .chain(extra.iter().copied())
            .filter(|d| !d.is_empty())
            .collect();

        let matches = matching::omnimatch(&chars, &dictionaries);
        let decomposition =
            scoring::most_guessable_sequence(&chars, matches, chrono::Local::now().year());

        let score = score_from_guesses(decomposition.guesses);
        let feedback = feedback::build(score, &decomposition.sequence);

        Estimate {
            score,
            guesses: decomposition.guesses,
            guesses_log10: decomposition.guesses.log10(),
            sequence: decomposition.sequence,
            feedback,
        }
    }
}
