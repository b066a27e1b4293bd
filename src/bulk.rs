//! Bulk classification of password lists.

use std::num::NonZeroUsize;
use std::sync::Arc;

use rayon::prelude::*;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::corpus::BannedTermCorpus;
use crate::estimator::Estimator;

/// Passwords longer than this are classified without analysis.
pub const LONG_PASSWORD_CHARS: usize = 30;

/// `log10(guesses)` a score-4 password needs to be very strong.
const VERY_STRONG_GUESSES_LOG10: f64 = 25.0;

#[derive(Error, Debug)]
pub enum BulkError {
    #[error("Failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkStatus {
    Weak,
    Moderate,
    Strong,
    VeryStrong,
}

impl BulkStatus {
    pub fn from_score(score: u8, guesses_log10: f64) -> Self {
        match score {
            0 | 1 => BulkStatus::Weak,
            2 | 3 => BulkStatus::Moderate,
            _ if guesses_log10 >= VERY_STRONG_GUESSES_LOG10 => BulkStatus::VeryStrong,
            _ => BulkStatus::Strong,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkResult {
    /// Position in the input.
    pub index: usize,
    pub status: BulkStatus,
}

/// Threads used for `max_workers`: at most four per available core.
pub fn worker_count(max_workers: usize) -> usize {
    let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
    max_workers.min(cores.saturating_mul(4)).max(1)
}

/// Classifies passwords against the built-in dictionaries and a banned
/// term corpus.
#[derive(Debug, Clone, Default)]
pub struct BulkClassifier {
    corpus: Arc<BannedTermCorpus>,
}

impl BulkClassifier {
    pub fn new(corpus: Arc<BannedTermCorpus>) -> Self {
        Self { corpus }
    }

    pub fn classify(&self, password: &str) -> BulkStatus {
        if password.chars().count() > LONG_PASSWORD_CHARS {
            return BulkStatus::VeryStrong;
        }
        let estimate = Estimator::standard().estimate_with(password, &[self.corpus.dictionary()]);
        BulkStatus::from_score(estimate.score, estimate.guesses_log10)
    }

    /// Classifies every password on a dedicated pool of
    /// [`worker_count`]`(max_workers)` threads. Results are in input order.
    pub fn classify_batch(
        &self,
        passwords: &[SecretString],
        max_workers: usize,
    ) -> Result<Vec<BulkResult>, BulkError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count(max_workers))
            .thread_name(|i| format!("pwd-bulk-{i}"))
            .build()?;

        let results: Vec<BulkResult> = pool.install(|| {
            passwords
                .par_iter()
                .enumerate()
                .map(|(index, password)| BulkResult {
                    index,
                    status: self.classify(password.expose_secret()),
                })
                .collect()
        });

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Bulk classification: {} passwords on {} workers",
            passwords.len(),
            pool.current_num_threads()
        );

        Ok(results)
    }
}

/// [`BulkClassifier::classify_batch`] without a banned term corpus.
pub fn classify_batch(
    passwords: &[SecretString],
    max_workers: usize,
) -> Result<Vec<BulkResult>, BulkError> {
    BulkClassifier::default().classify_batch(passwords, max_workers)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets(passwords: &[&str]) -> Vec<SecretString> {
        passwords
            .iter()
            .map(|p| SecretString::new(p.to_string().into()))
            .collect()
    }

    #[test]
    fn test_status_thresholds() {
        assert_eq!(BulkStatus::from_score(0, 0.5), BulkStatus::Weak);
        assert_eq!(BulkStatus::from_score(1, 5.0), BulkStatus::Weak);
        assert_eq!(BulkStatus::from_score(3, 9.0), BulkStatus::Moderate);
        assert_eq!(BulkStatus::from_score(4, 12.0), BulkStatus::Strong);
        assert_eq!(BulkStatus::from_score(4, 25.0), BulkStatus::VeryStrong);
    }

    #[test]
    fn test_long_passwords_skip_analysis() {
        let classifier = BulkClassifier::default();
        assert_eq!(classifier.classify(&"a".repeat(31)), BulkStatus::VeryStrong);
        assert_eq!(classifier.classify(&"a".repeat(30)), BulkStatus::Weak);
    }

    #[test]
    fn test_corpus_terms_weaken() {
        let classifier = BulkClassifier::new(Arc::new(BannedTermCorpus::from_terms(
            "test",
            ["zebraquiltmarmalade"],
        )));
        assert_eq!(classifier.classify("zebraquiltmarmalade"), BulkStatus::Weak);
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let long = "x".repeat(40);
        let passwords = secrets(&["password", long.as_str(), "123456", "qwerty"]);
        let results = classify_batch(&passwords, 3).unwrap();

        assert_eq!(results.len(), 4);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.index, i);
        }
        assert_eq!(results[0].status, BulkStatus::Weak);
        assert_eq!(results[1].status, BulkStatus::VeryStrong);
        assert_eq!(results[2].status, BulkStatus::Weak);
    }

    #[test]
    fn test_worker_count_bounds() {
        assert_eq!(worker_count(0), 1);
        assert_eq!(worker_count(1), 1);
        let cores = std::thread::available_parallelism().map_or(1, NonZeroUsize::get);
        assert_eq!(worker_count(usize::MAX), cores * 4);
    }

    #[test]
    fn test_empty_batch() {
        assert!(classify_batch(&[], 4).unwrap().is_empty());
    }
}
