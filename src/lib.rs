//! Password risk analysis library
//!
//! This library checks a candidate password through several independent
//! layers and collects every verdict into one report:
//!
//! - breach lookup against sharded Bloom filters, including leetspeak
//!   normalizations and common obfuscations of the password
//! - banned term detection against an append-only term corpus
//! - strength scoring with a configurable composition policy
//! - crack-time estimation, statistical or through an external cracker
//! - personal information leakage from the user's identity fields
//!
//! # Features
//!
//! - `async` (default): Enables cancellation and channel delivery of reports
//! - `tracing`: Enables logging via tracing crate
//!
//! # Environment Variables
//!
//! - `PWD_SHARD_DIR`: Directory of breach shards
//!   (default: `./assets/bloom_filters`)
//! - `PWD_CORPUS_DIR`: Directory of banned term segments
//!   (default: `./assets/banned_words`)
//! - `PWD_CRACK_TIMEOUT_SECS`: Time budget of the external cracker
//! - `PWD_CRACKER_PATH` and `PWD_CRACKER_WORDLIST`: Enable the external
//!   cracker when both are set
//!
//! # Example
//!
//! ```rust,no_run
//! use std::collections::BTreeMap;
//! use std::sync::Arc;
//!
//! use pwd_risk::{AnalysisRequest, Pipeline, PipelineConfig};
//! use secrecy::SecretString;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(PipelineConfig::from_env()?);
//! let pipeline = Pipeline::from_config(config);
//!
//! let identity = BTreeMap::from([("Birthday".to_string(), "05-12-1998".to_string())]);
//! let request = AnalysisRequest::new(SecretString::new("Summ3r1998!".to_string().into()))
//!     .with_identity(identity)
//!     .with_custom_terms(["summer"]);
//!
//! let report = pipeline.analyze(&request).await?;
//! println!("Flagged: {}", report.flagged);
//! println!("{}", report.to_json()?);
//! # Ok(())
//! # }
//! ```

// Re-export types from pwd-types for convenience
pub use pwd_types::{PasswordEvaluation, PasswordScore, PasswordStrength};

pub mod banned;
pub mod bulk;
pub mod composition;
pub mod config;
pub mod corpus;
pub mod crack_time;
pub mod estimator;
pub mod leet;
pub mod membership;
pub mod pii;
pub mod pipeline;
pub mod variants;

// Internal modules
mod error;
mod evaluator;
mod sections;

// Public API
pub use banned::{analyze_variants, BannedAnalyzer, VariantAnalysis};
pub use bulk::{classify_batch, BulkClassifier, BulkError, BulkResult, BulkStatus};
pub use composition::{CompositionPolicy, Constraint, Feature, FailedCondition};
pub use config::{ConfigError, ConfigHandle, PipelineConfig};
pub use corpus::{BannedTermCorpus, CorpusError};
pub use crack_time::{
    CrackBackend, CrackTimeEstimator, CrackTimeReport, ExternalCracker, StatisticalEstimator,
};
pub use error::{InputError, LayerError};
pub use estimator::{Estimate, Estimator};
pub use evaluator::{evaluate_password_strength, SectionScorer, StrengthReport, StrengthScorer};
pub use membership::{CompromiseCheck, LookupBudget, MembershipIndex, ShardBuilder};
pub use pii::{build_term_set, match_against_password, FieldKind, PiiTermSet};
pub use pipeline::{AnalysisRequest, LayerReport, LayerStatus, MatchReport, Pipeline};
pub use variants::{normalize, obfuscate, NormalizeLimits, VariantSet};

#[cfg(feature = "async")]
pub use evaluator::evaluate_password_strength_tx;
