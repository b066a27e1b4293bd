//! Layered risk analysis of one password.
//!
//! Layers run in a fixed order, each exactly once: breach lookup, banned
//! patterns, strength, crack time, then PII when identity data is supplied.
//! A failing layer is reported as `unknown` and the remaining layers still
//! run. Only malformed input rejects the whole request.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[cfg(feature = "async")]
use tokio::sync::mpsc;

#[cfg(feature = "async")]
use tokio_util::sync::CancellationToken;

use crate::banned::BannedAnalyzer;
use crate::bulk::{BulkClassifier, BulkError, BulkResult};
use crate::config::PipelineConfig;
use crate::corpus::BannedTermCorpus;
use crate::crack_time::{CrackBackend, CrackTimeEstimator};
use crate::error::{InputError, LayerError};
use crate::evaluator::{SectionScorer, StrengthScorer};
use crate::membership::MembershipIndex;
use crate::pii;

pub const LEAKED_PASSWORD_DETECTION: &str = "Leaked-Password-Detection";
pub const BANNED_WORDS_DETECTION: &str = "Banned-Words-Detection";
pub const STRENGTH_ANALYSIS: &str = "Strength-Analysis";
pub const CRACK_TIME_ESTIMATION: &str = "Crack-Time-Estimation";
pub const PII_DETECTION: &str = "PII-Detection";

/// Password plus optional identity data and extra banned terms.
pub struct AnalysisRequest {
    pub password: SecretString,
    pub identity: Option<BTreeMap<String, String>>,
    pub custom_terms: Vec<String>,
}

impl AnalysisRequest {
    pub fn new(password: SecretString) -> Self {
        Self {
            password,
            identity: None,
            custom_terms: Vec::new(),
        }
    }

    pub fn with_identity(mut self, identity: BTreeMap<String, String>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn with_custom_terms<I, S>(mut self, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_terms = terms.into_iter().map(Into::into).collect();
        self
    }

    fn validate(&self) -> Result<(), InputError> {
        if self.password.expose_secret().is_empty() {
            return Err(InputError::EmptyPassword);
        }
        if let Some(identity) = &self.identity {
            if let Some(position) = identity.keys().position(|key| key.trim().is_empty()) {
                return Err(InputError::EmptyIdentityField { position });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerStatus {
    Clear,
    Flagged,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReport {
    pub name: String,
    pub status: LayerStatus,
    pub evidence: Value,
    /// Set when the status is `unknown`.
    pub error: Option<String>,
    /// A variant cap or lookup budget cut this layer's search short.
    pub truncated: bool,
}

impl LayerReport {
    fn verdict(name: &str, flagged: bool, evidence: Value, truncated: bool) -> Self {
        Self {
            name: name.to_string(),
            status: if flagged {
                LayerStatus::Flagged
            } else {
                LayerStatus::Clear
            },
            evidence,
            error: None,
            truncated,
        }
    }

    fn unknown(name: &str, error: &LayerError) -> Self {
        #[cfg(feature = "tracing")]
        tracing::warn!("Layer {} degraded to unknown: {}", name, error);

        Self {
            name: name.to_string(),
            status: LayerStatus::Unknown,
            evidence: Value::Null,
            error: Some(error.to_string()),
            truncated: false,
        }
    }

    pub fn is_flagged(&self) -> bool {
        self.status == LayerStatus::Flagged
    }
}

/// Merged verdict of every layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub layers: Vec<LayerReport>,
    pub flagged: bool,
    /// Names of flagged layers, in pipeline order.
    pub flagged_layers: Vec<String>,
    pub truncated: bool,
    pub config_version: u64,
}

impl MatchReport {
    fn aggregate(layers: Vec<LayerReport>, config_version: u64) -> Self {
        let flagged_layers: Vec<String> = layers
            .iter()
            .filter(|layer| layer.is_flagged())
            .map(|layer| layer.name.clone())
            .collect();
        Self {
            flagged: !flagged_layers.is_empty(),
            truncated: layers.iter().any(|layer| layer.truncated),
            flagged_layers,
            layers,
            config_version,
        }
    }

    pub fn layer(&self, name: &str) -> Option<&LayerReport> {
        self.layers.iter().find(|layer| layer.name == name)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Stops remaining layers once its token is cancelled.
#[derive(Clone, Copy, Default)]
struct Interrupt<'a> {
    #[cfg(feature = "async")]
    token: Option<&'a CancellationToken>,
    #[cfg(not(feature = "async"))]
    _marker: std::marker::PhantomData<&'a ()>,
}

impl Interrupt<'_> {
    fn is_cancelled(&self) -> bool {
        #[cfg(feature = "async")]
        return self.token.is_some_and(CancellationToken::is_cancelled);

        #[cfg(not(feature = "async"))]
        false
    }

    /// Runs `work` unless cancelled first; `None` when cancelled.
    async fn guard<F: Future>(&self, work: F) -> Option<F::Output> {
        #[cfg(feature = "async")]
        if let Some(token) = self.token {
            return token.run_until_cancelled(work).await;
        }
        Some(work.await)
    }
}

/// The analysis pipeline, bound to one configuration snapshot.
pub struct Pipeline<C = CrackBackend> {
    config: Arc<PipelineConfig>,
    index: Arc<MembershipIndex>,
    corpus: Arc<BannedTermCorpus>,
    scorer: Arc<dyn StrengthScorer>,
    cracker: C,
    banned: BannedAnalyzer,
}

impl Pipeline<CrackBackend> {
    /// Opens the shard index and loads the corpus named by `config`.
    pub fn from_config(config: Arc<PipelineConfig>) -> Self {
        let index = Arc::new(MembershipIndex::open(&config.shard_dir));
        let corpus = Arc::new(BannedTermCorpus::load(&config.corpus_dir));
        let scorer = Arc::new(SectionScorer::new(Arc::clone(&corpus)));
        let cracker = config.crack_backend();
        Self::new(config, index, corpus, scorer, cracker)
    }
}

impl<C: CrackTimeEstimator> Pipeline<C> {
    pub fn new(
        config: Arc<PipelineConfig>,
        index: Arc<MembershipIndex>,
        corpus: Arc<BannedTermCorpus>,
        scorer: Arc<dyn StrengthScorer>,
        cracker: C,
    ) -> Self {
        let banned = BannedAnalyzer::new(Arc::clone(&corpus), config.normalize_limits());
        Self {
            config,
            index,
            corpus,
            scorer,
            cracker,
            banned,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn index(&self) -> &MembershipIndex {
        &self.index
    }

    pub fn corpus(&self) -> &BannedTermCorpus {
        &self.corpus
    }

    /// Bulk classification against this pipeline's corpus, on at most
    /// `bulk_max_workers` threads.
    pub fn classify_batch(&self, passwords: &[SecretString]) -> Result<Vec<BulkResult>, BulkError> {
        BulkClassifier::new(Arc::clone(&self.corpus))
            .classify_batch(passwords, self.config.bulk_max_workers)
    }

    /// Runs every layer and merges their verdicts.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<MatchReport, InputError> {
        self.run(request, Interrupt::default()).await
    }

    /// [`Pipeline::analyze`] that stops at the next layer boundary once
    /// `token` is cancelled. Layers that did not complete are reported as
    /// `unknown` with a cancellation error.
    #[cfg(feature = "async")]
    pub async fn analyze_with_cancel(
        &self,
        request: &AnalysisRequest,
        token: CancellationToken,
    ) -> Result<MatchReport, InputError> {
        self.run(request, Interrupt { token: Some(&token) }).await
    }

    /// Async version that sends the report via channel.
    #[cfg(feature = "async")]
    pub async fn analyze_tx(
        &self,
        request: &AnalysisRequest,
        token: CancellationToken,
        tx: mpsc::Sender<Result<MatchReport, InputError>>,
    ) {
        #[cfg(feature = "tracing")]
        tracing::info!("analysis is about to start...");

        let report = self.analyze_with_cancel(request, token).await;

        if let Err(_e) = tx.send(report).await {
            #[cfg(feature = "tracing")]
            tracing::error!("Failed to send analysis report: {}", _e);
        }
    }

    async fn run(
        &self,
        request: &AnalysisRequest,
        interrupt: Interrupt<'_>,
    ) -> Result<MatchReport, InputError> {
        request.validate()?;

        let mut names = vec![
            LEAKED_PASSWORD_DETECTION,
            BANNED_WORDS_DETECTION,
            STRENGTH_ANALYSIS,
            CRACK_TIME_ESTIMATION,
        ];
        if request.identity.is_some() {
            names.push(PII_DETECTION);
        }

        let mut layers = Vec::with_capacity(names.len());
        for name in names {
            if interrupt.is_cancelled() {
                layers.push(LayerReport::unknown(name, &LayerError::Cancelled));
                continue;
            }
            let layer = async {
                match name {
                    LEAKED_PASSWORD_DETECTION => self.breach_layer(request).await,
                    BANNED_WORDS_DETECTION => self.banned_layer(request).await,
                    STRENGTH_ANALYSIS => self.strength_layer(request).await,
                    CRACK_TIME_ESTIMATION => self.crack_layer(request).await,
                    _ => self.pii_layer(request).await,
                }
            };
            let report = match interrupt.guard(layer).await {
                Some(report) => report,
                None => LayerReport::unknown(name, &LayerError::Cancelled),
            };
            layers.push(report);
        }

        Ok(MatchReport::aggregate(layers, self.config.version))
    }

    async fn breach_layer(&self, request: &AnalysisRequest) -> LayerReport {
        let index = Arc::clone(&self.index);
        let budget = self.config.lookup_budget();
        let password = detach(&request.password);
        on_blocking_pool(LEAKED_PASSWORD_DETECTION, move || {
            let check = index.check_compromised(password.expose_secret(), &budget);
            LayerReport::verdict(LEAKED_PASSWORD_DETECTION, check.found, json!(check), check.truncated)
        })
        .await
    }

    async fn banned_layer(&self, request: &AnalysisRequest) -> LayerReport {
        let analyzer = self.banned.clone();
        let custom_terms = request.custom_terms.clone();
        let password = detach(&request.password);
        on_blocking_pool(BANNED_WORDS_DETECTION, move || {
            let custom: Vec<&str> = custom_terms.iter().map(String::as_str).collect();
            let analysis = analyzer.analyze(password.expose_secret(), &custom);
            LayerReport::verdict(
                BANNED_WORDS_DETECTION,
                analysis.is_flagged(),
                json!(analysis),
                analysis.truncated,
            )
        })
        .await
    }

    async fn strength_layer(&self, request: &AnalysisRequest) -> LayerReport {
        let scorer = Arc::clone(&self.scorer);
        let policy = self.config.composition.clone();
        let password = detach(&request.password);
        on_blocking_pool(STRENGTH_ANALYSIS, move || match scorer.score(&password, &policy) {
            Ok(report) => {
                let evidence = json!({
                    "score": report.evaluation.score.as_ref().map(|s| s.value()),
                    "strength": format!("{:?}", report.strength()),
                    "reasons": report.evaluation.reasons,
                    "features": report.features,
                    "failed_conditions": report.failed_conditions,
                });
                LayerReport::verdict(STRENGTH_ANALYSIS, report.is_flagged(), evidence, false)
            }
            Err(e) => LayerReport::unknown(STRENGTH_ANALYSIS, &e),
        })
        .await
    }

    async fn crack_layer(&self, request: &AnalysisRequest) -> LayerReport {
        match self.cracker.estimate(&request.password).await {
            Ok(report) => {
                let flagged = report.is_flagged(self.config.min_crack_seconds);
                let mut evidence = json!(report);
                evidence["estimated_seconds"] = json!(report.estimated_seconds());
                LayerReport::verdict(CRACK_TIME_ESTIMATION, flagged, evidence, false)
            }
            Err(e) => LayerReport::unknown(CRACK_TIME_ESTIMATION, &e),
        }
    }

    async fn pii_layer(&self, request: &AnalysisRequest) -> LayerReport {
        let identity = request.identity.clone().unwrap_or_default();
        let limits = self.config.normalize_limits();
        let password = detach(&request.password);
        on_blocking_pool(PII_DETECTION, move || {
            let terms = pii::build_term_set(&identity);
            match pii::match_with_limits(password.expose_secret(), &terms, limits) {
                Ok(matches) => LayerReport::verdict(
                    PII_DETECTION,
                    !matches.matched_terms.is_empty(),
                    json!({
                        "matched_terms": matches.matched_terms,
                        "terms_checked": terms.len(),
                        "variants_checked": matches.variants_checked,
                    }),
                    matches.truncated,
                ),
                Err(e) => {
                    LayerReport::unknown(PII_DETECTION, &LayerError::Collaborator(e.to_string()))
                }
            }
        })
        .await
    }
}

/// Owned copy of a password for work moved off the request.
fn detach(password: &SecretString) -> SecretString {
    SecretString::new(password.expose_secret().into())
}

/// Runs a CPU-bound layer on the blocking pool. A panicking layer is
/// reported as `unknown`.
async fn on_blocking_pool<F>(name: &'static str, work: F) -> LayerReport
where
    F: FnOnce() -> LayerReport + Send + 'static,
{
    match tokio::task::spawn_blocking(work).await {
        Ok(report) => report,
        Err(e) => LayerReport::unknown(
            name,
            &LayerError::Collaborator(format!("{name} task failed: {e}")),
        ),
    }
}


#[cfg(all(test, feature = "async"))]
mod async_tests {
    use super::*;
    use crate::crack_time::StatisticalEstimator;

    fn pipeline() -> Pipeline<StatisticalEstimator> {
        Pipeline::new(
            Arc::new(PipelineConfig::default()),
            Arc::new(MembershipIndex::open("/nonexistent/shards")),
            Arc::new(BannedTermCorpus::empty()),
            Arc::new(SectionScorer::default()),
            StatisticalEstimator,
        )
    }

    fn request(pwd: &str) -> AnalysisRequest {
        AnalysisRequest::new(SecretString::new(pwd.to_string().into()))
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let token = CancellationToken::new();
        token.cancel();

        let report = pipeline()
            .analyze_with_cancel(&request("hunter2"), token)
            .await
            .unwrap();

        assert_eq!(report.layers.len(), 4);
        for layer in &report.layers {
            assert_eq!(layer.status, LayerStatus::Unknown);
            assert_eq!(layer.error.as_deref(), Some("Evaluation cancelled"));
        }
        assert!(!report.flagged);
    }

    #[tokio::test]
    async fn test_analyze_tx() {
        let (tx, mut rx) = mpsc::channel(1);
        pipeline()
            .analyze_tx(&request("hunter2"), CancellationToken::new(), tx)
            .await;

        let report = rx.recv().await.expect("Should receive report").unwrap();
        assert_eq!(report.layers.len(), 4);
        assert!(report.layers.iter().all(|l| l.status != LayerStatus::Unknown));
    }

    #[tokio::test]
    async fn test_analyze_tx_reports_input_error() {
        let (tx, mut rx) = mpsc::channel(1);
        pipeline()
            .analyze_tx(&request(""), CancellationToken::new(), tx)
            .await;

        let result = rx.recv().await.expect("Should receive result");
        assert_eq!(result, Err(InputError::EmptyPassword));
    }
}
