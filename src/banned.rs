//! Banned and weak pattern analysis.
//!
//! Compares the password as typed against its de-obfuscated variants. A
//! password that only looks strong because of leet substitutions scores
//! higher than its weakest normalized variant; that gap is the signal.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::corpus::BannedTermCorpus;
use crate::estimator::{Estimate, Estimator, MatchKind, PatternMatch, RankedDictionary, USER_INPUTS};
use crate::leet::SubstitutionTable;
use crate::variants::{self, NormalizeLimits};

/// Dictionary words shorter than this are left out of reports.
const MIN_REPORTED_WORD_LEN: usize = 3;

/// One pattern of the chosen decomposition, as reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternReport {
    pub pattern: String,
    pub token: String,
    pub dictionary_name: Option<String>,
    pub matched_word: Option<String>,
    pub rank: Option<usize>,
}

impl PatternReport {
    fn from_match(m: &PatternMatch) -> Self {
        let (pattern, dictionary_name, matched_word, rank) = match &m.kind {
            MatchKind::Dictionary {
                dictionary_name,
                matched_word,
                rank,
                reversed,
            } => (
                if *reversed { "reversed_dictionary" } else { "dictionary" },
                Some(dictionary_name.clone()),
                Some(matched_word.clone()),
                Some(*rank),
            ),
            MatchKind::Sequence { .. } => ("sequence", None, None, None),
            MatchKind::Repeat { .. } => ("repeat", None, None, None),
            MatchKind::Year => ("year", None, None, None),
            MatchKind::Bruteforce => ("bruteforce", None, None, None),
        };
        Self {
            pattern: pattern.to_string(),
            token: m.token.clone(),
            dictionary_name,
            matched_word,
            rank,
        }
    }

    fn is_dictionary(&self) -> bool {
        self.matched_word.is_some()
    }
}

/// Estimate of one candidate string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PasswordAnalysis {
    /// Never serialized.
    #[serde(skip)]
    pub password: String,
    pub score: u8,
    pub guesses: f64,
    /// `log10(guesses)` rounded to two decimals.
    pub entropy: f64,
    pub patterns: Vec<PatternReport>,
    pub warning: String,
    pub suggestions: Vec<String>,
}

impl PasswordAnalysis {
    fn from_estimate(password: &str, estimate: Estimate) -> Self {
        let patterns = estimate
            .sequence
            .iter()
            .filter(|m| {
                m.matched_word()
                    .is_none_or(|w| w.chars().count() >= MIN_REPORTED_WORD_LEN)
            })
            .map(PatternReport::from_match)
            .collect();

        Self {
            password: password.to_string(),
            score: estimate.score,
            guesses: estimate.guesses,
            entropy: (estimate.guesses_log10 * 100.0).round() / 100.0,
            patterns,
            warning: estimate.feedback.warning,
            suggestions: estimate.feedback.suggestions,
        }
    }

    /// Whether a reportable dictionary word was found.
    pub fn has_dictionary_pattern(&self) -> bool {
        self.patterns.iter().any(PatternReport::is_dictionary)
    }
}

/// Original password versus its weakest normalized variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantAnalysis {
    pub original: PasswordAnalysis,
    pub weakest_normalized: PasswordAnalysis,
    pub normalized_is_weaker: bool,
    pub variants_evaluated: usize,
    pub truncated: bool,
    /// Present when the normalized variant is weaker.
    pub explanation: Option<String>,
}

impl VariantAnalysis {
    /// The original hits a dictionary word, or a weaker normalized variant
    /// does.
    pub fn is_flagged(&self) -> bool {
        self.original.has_dictionary_pattern()
            || (self.normalized_is_weaker && self.weakest_normalized.has_dictionary_pattern())
    }
}

/// Analyzer bound to an estimator, a corpus and variant limits.
#[derive(Debug, Clone)]
pub struct BannedAnalyzer {
    estimator: Arc<Estimator>,
    corpus: Arc<BannedTermCorpus>,
    limits: NormalizeLimits,
}

impl Default for BannedAnalyzer {
    fn default() -> Self {
        Self::new(Arc::new(BannedTermCorpus::empty()), NormalizeLimits::default())
    }
}

impl BannedAnalyzer {
    pub fn new(corpus: Arc<BannedTermCorpus>, limits: NormalizeLimits) -> Self {
        Self {
            estimator: Arc::new(Estimator::new()),
            corpus,
            limits,
        }
    }

    pub fn with_estimator(mut self, estimator: Arc<Estimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn corpus(&self) -> &BannedTermCorpus {
        &self.corpus
    }

    /// Estimates the password as typed and every normalized variant of its
    /// lowercase form, keeping the weakest.
    ///
    /// The lowercase form itself is evaluated first; among equal scores the
    /// first one seen is kept.
    pub fn analyze(&self, password: &str, custom_terms: &[&str]) -> VariantAnalysis {
        let custom = RankedDictionary::from_ordered(USER_INPUTS, custom_terms.iter().copied());
        let dictionaries = [&custom, self.corpus.dictionary()];
        let estimate = |candidate: &str| self.estimator.estimate_with(candidate, &dictionaries);

        let original = PasswordAnalysis::from_estimate(password, estimate(password));

        let lowered = password.to_lowercase();
        let normalized = variants::normalize_with(&lowered, SubstitutionTable::standard(), self.limits);

        let mut weakest_variant = lowered.clone();
        let mut weakest = estimate(&lowered);
        let mut evaluated = 1;
        for variant in normalized.iter().filter(|v| *v != lowered) {
            evaluated += 1;
            let candidate = estimate(variant);
            if candidate.score < weakest.score {
                weakest = candidate;
                weakest_variant = variant.to_string();
            }
        }

        let weakest_normalized = PasswordAnalysis::from_estimate(&weakest_variant, weakest);
        let normalized_is_weaker = weakest_normalized.score < original.score;
        let explanation = normalized_is_weaker.then(|| {
            format!(
                "The normalized password scores {} against {} for the original \
                 (entropy {} vs {}), so it is easier to guess than it looks",
                weakest_normalized.score,
                original.score,
                weakest_normalized.entropy,
                original.entropy
            )
        });

        #[cfg(feature = "tracing")]
        if normalized.is_truncated() {
            tracing::debug!("Banned pattern analysis ran on a truncated variant set");
        }

        VariantAnalysis {
            original,
            weakest_normalized,
            normalized_is_weaker,
            variants_evaluated: evaluated,
            truncated: normalized.is_truncated(),
            explanation,
        }
    }
}

/// [`BannedAnalyzer::analyze`] with the built-in dictionaries, no corpus and
/// default limits.
pub fn analyze_variants(password: &str, custom_terms: &[&str]) -> VariantAnalysis {
    BannedAnalyzer::default().analyze(password, custom_terms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leet_hides_banned_term() {
        let analysis = analyze_variants("Summ3r2024!", &["summer"]);

        assert_eq!(analysis.original.score, 3);
        assert_eq!(analysis.weakest_normalized.score, 2);
        assert!(analysis.normalized_is_weaker);
        assert!(analysis.is_flagged());
        assert!(analysis.explanation.is_some());
        assert!(analysis.weakest_normalized.has_dictionary_pattern());
        assert!(!analysis.original.has_dictionary_pattern());
        assert!(analysis.weakest_normalized.password.starts_with("summer"));
    }

    #[test]
    fn test_plain_strong_password_is_not_flagged() {
        let analysis = analyze_variants("vK8#qLz?Wp@xR", &[]);
        assert!(!analysis.normalized_is_weaker);
        assert!(!analysis.is_flagged());
        assert!(analysis.explanation.is_none());
        // '8', '#' and '@' each have one plain reading.
        assert_eq!(analysis.variants_evaluated, 8);
    }

    #[test]
    fn test_weaker_variant_without_dictionary_word_is_not_flagged() {
        // Every glyph reads as 'e'; the all-'e' reading is a plain repeat.
        let analysis = analyze_variants("3€&&3€3&€€", &[]);

        assert!(analysis.normalized_is_weaker);
        assert!(analysis.weakest_normalized.score < analysis.original.score);
        assert!(!analysis.weakest_normalized.has_dictionary_pattern());
        assert!(!analysis.original.has_dictionary_pattern());
        assert!(!analysis.is_flagged());
    }

    #[test]
    fn test_analysis_json_omits_password() {
        let analysis = analyze_variants("Summ3r2024!", &["summer"]);
        let json = serde_json::to_string(&analysis).unwrap();
        assert!(!json.contains("Summ3r2024!"));
        assert!(!json.contains("\"password\""));
    }

    #[test]
    fn test_leet_heavy_input_stays_under_variant_cap() {
        let password = "1!|".repeat(10);
        let analysis = analyze_variants(&password, &[]);

        assert!(analysis.truncated);
        assert!(analysis.variants_evaluated <= crate::variants::DEFAULT_MAX_NORMALIZED);
        assert!(analysis.variants_evaluated > 1);
    }

    #[test]
    fn test_no_substitutions_evaluates_lowercase_only() {
        let analysis = analyze_variants("Zebra-Quilt", &[]);
        assert_eq!(analysis.variants_evaluated, 1);
        assert_eq!(analysis.weakest_normalized.password, "zebra-quilt");
    }

    #[test]
    fn test_common_password_is_flagged_by_pattern() {
        let analysis = analyze_variants("dragon", &[]);
        assert!(analysis.original.has_dictionary_pattern());
        assert!(analysis.is_flagged());
        assert_eq!(analysis.original.patterns[0].matched_word.as_deref(), Some("dragon"));
    }

    #[test]
    fn test_short_dictionary_words_are_not_reported() {
        let analysis = analyze_variants("xq", &["xq"]);
        assert_eq!(analysis.original.score, 0);
        assert!(analysis.original.patterns.is_empty());
        assert!(!analysis.original.has_dictionary_pattern());
    }

    #[test]
    fn test_corpus_terms_are_used() {
        let corpus = Arc::new(BannedTermCorpus::from_terms("test", ["acmecorp"]));
        let analyzer = BannedAnalyzer::new(corpus, NormalizeLimits::default());
        let analysis = analyzer.analyze("4cm3c0rp", &[]);
        assert!(analysis.normalized_is_weaker);
        assert_eq!(analysis.weakest_normalized.password, "acmecorp");
    }

    #[test]
    fn test_entropy_is_rounded() {
        let analysis = analyze_variants("qx7!", &[]);
        assert_eq!(analysis.original.entropy, 4.0);
    }
}
