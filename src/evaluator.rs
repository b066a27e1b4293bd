//! Strength evaluator - section checks, 0–100 score and composition policy.

use std::sync::Arc;

use pwd_types::{PasswordEvaluation, PasswordScore, PasswordStrength};
use secrecy::{ExposeSecret, SecretString};

#[cfg(feature = "async")]
use tokio::sync::mpsc;

#[cfg(feature = "async")]
use tokio_util::sync::CancellationToken;

use crate::composition::{CompositionFeatures, CompositionPolicy, FailedCondition};
use crate::corpus::BannedTermCorpus;
use crate::error::LayerError;
use crate::estimator::Estimator;
use crate::sections::{
    character_variety_section, class_count, corpus_section, length_section,
    pattern_analysis_section, Section, SectionContext,
};

const CANCELLED_REASON: &str = "Evaluation cancelled";
const SECTION_ERROR_REASON: &str = "Error";

/// Evaluates password strength and returns a detailed evaluation.
///
/// # Arguments
/// * `password` - The password to evaluate
/// * `corpus` - Banned terms consulted by the corpus section
/// * `token` - Optional cancellation token (async feature only)
///
/// # Returns
/// A `PasswordEvaluation` containing score and reasons.
pub fn evaluate_password_strength(
    password: &SecretString,
    corpus: &BannedTermCorpus,
    #[cfg(feature = "async")] token: Option<CancellationToken>,
) -> PasswordEvaluation {
    let mut reasons = Vec::new();
    let mut is_cancelled = false;
    let mut failed = false;

    let ctx = SectionContext { corpus };
    let sections: [(&str, Section); 4] = [
        ("corpus", corpus_section),
        ("length", length_section),
        ("variety", character_variety_section),
        ("pattern", pattern_analysis_section),
    ];

    for (_section_name, section_fn) in sections {
        #[cfg(feature = "async")]
        if token.as_ref().is_some_and(CancellationToken::is_cancelled) {
            reasons.push(CANCELLED_REASON.to_string());
            is_cancelled = true;
            break;
        }

        match section_fn(password, &ctx) {
            Ok(Some(reason)) => reasons.push(reason),
            Ok(None) => {}
            Err(()) => {
                #[cfg(feature = "tracing")]
                tracing::error!("Fatal error in password evaluation section: {}", _section_name);
                reasons.push(SECTION_ERROR_REASON.to_string());
                failed = true;
                break;
            }
        }
    }

    let score = (!is_cancelled && !failed)
        .then(|| section_score(password.expose_secret(), reasons.len()));

    PasswordEvaluation {
        score: score.map(PasswordScore::new),
        reasons,
    }
}

/// Score from 0 to 100 before clamping: length, variety and uniqueness
/// bonuses minus 10 per failed section.
fn section_score(pwd: &str, reasons: usize) -> i64 {
    let len = pwd.chars().count();

    // 0.5 per character, at most 20
    let mut score = (len as f64 * 0.5).min(20.0) as i64;

    score += (class_count(pwd) * 15) as i64;

    if len > 16 {
        score += 10;
    } else if len > 12 {
        score += 5;
    }

    if pwd.chars().filter(|c| !c.is_alphanumeric()).count() >= 2 {
        score += 5;
    }

    let unique = pwd.chars().collect::<std::collections::HashSet<_>>().len();
    if unique >= 16 {
        score += 10;
    } else if unique >= 12 {
        score += 5;
    }

    (score - reasons as i64 * 10).clamp(0, 100)
}

/// Async version that sends evaluation result via channel.
#[cfg(feature = "async")]
pub async fn evaluate_password_strength_tx(
    password: &SecretString,
    corpus: &BannedTermCorpus,
    token: CancellationToken,
    tx: mpsc::Sender<PasswordEvaluation>,
) {
    #[cfg(feature = "tracing")]
    tracing::info!("evaluation is about to start...");

    tokio::task::yield_now().await;
    let evaluation = evaluate_password_strength(password, corpus, Some(token));

    if let Err(_e) = tx.send(evaluation).await {
        #[cfg(feature = "tracing")]
        tracing::error!("Failed to send password evaluation result: {}", _e);
    }
}

/// Strength layer verdict.
pub struct StrengthReport {
    pub evaluation: PasswordEvaluation,
    pub features: CompositionFeatures,
    pub failed_conditions: Vec<FailedCondition>,
}

impl StrengthReport {
    pub fn strength(&self) -> PasswordStrength {
        self.evaluation.strength()
    }

    /// Any constraint failed, or the score bottomed out.
    pub fn is_flagged(&self) -> bool {
        !self.failed_conditions.is_empty()
            || self.evaluation.score.as_ref().is_some_and(|s| s.value() <= 0)
    }
}

/// Scores a password and checks it against a composition policy.
pub trait StrengthScorer: Send + Sync {
    fn score(
        &self,
        password: &SecretString,
        policy: &CompositionPolicy,
    ) -> Result<StrengthReport, LayerError>;
}

/// Default scorer: the evaluation sections plus measured composition.
#[derive(Debug, Clone)]
pub struct SectionScorer {
    corpus: Arc<BannedTermCorpus>,
}

impl Default for SectionScorer {
    fn default() -> Self {
        Self::new(Arc::new(BannedTermCorpus::empty()))
    }
}

impl SectionScorer {
    pub fn new(corpus: Arc<BannedTermCorpus>) -> Self {
        Self { corpus }
    }
}

impl StrengthScorer for SectionScorer {
    fn score(
        &self,
        password: &SecretString,
        policy: &CompositionPolicy,
    ) -> Result<StrengthReport, LayerError> {
        #[cfg(feature = "async")]
        let evaluation = evaluate_password_strength(password, &self.corpus, None);

        #[cfg(not(feature = "async"))]
        let evaluation = evaluate_password_strength(password, &self.corpus);

        if evaluation.score.is_none() {
            return Err(LayerError::Collaborator(format!(
                "strength evaluation failed: {}",
                evaluation.reasons.join("; ")
            )));
        }

        let pwd = password.expose_secret();
        let estimate = Estimator::standard().estimate_with(pwd, &[self.corpus.dictionary()]);
        let features = CompositionFeatures::measure(pwd, &estimate);
        let failed_conditions = policy.check(&features);

        Ok(StrengthReport {
            evaluation,
            features,
            failed_conditions,
        })
    }
}
