//! Pipeline configuration.
//!
//! A [`PipelineConfig`] is an immutable, versioned snapshot. Requests hold an
//! `Arc` to the snapshot they started with; [`ConfigHandle::update`] publishes
//! a new version without disturbing them.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::composition::CompositionPolicy;
use crate::corpus::{CORPUS_DIR_ENV, DEFAULT_CORPUS_DIR};
use crate::crack_time::{CrackBackend, ExternalCracker, StatisticalEstimator};
use crate::membership::{LookupBudget, DEFAULT_MAX_LOOKUPS};
use crate::variants::{
    NormalizeLimits, DEFAULT_MAX_DEPTH, DEFAULT_MAX_NORMALIZED, DEFAULT_MAX_OBFUSCATED,
    DEFAULT_MAX_STEPS,
};

pub const SHARD_DIR_ENV: &str = "PWD_SHARD_DIR";
pub const DEFAULT_SHARD_DIR: &str = "./assets/bloom_filters";
pub const CRACK_TIMEOUT_ENV: &str = "PWD_CRACK_TIMEOUT_SECS";
pub const CRACKER_PATH_ENV: &str = "PWD_CRACKER_PATH";
pub const CRACKER_WORDLIST_ENV: &str = "PWD_CRACKER_WORDLIST";

const DEFAULT_CRACK_TIMEOUT_SECS: u64 = 15;
const DEFAULT_MIN_CRACK_SECONDS: f64 = 3600.0;
const DEFAULT_BULK_MAX_WORKERS: usize = 32;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// External cracking program settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrackerConfig {
    pub program: PathBuf,
    pub wordlist: PathBuf,
    /// Arguments placed before the per-run arguments.
    #[serde(default)]
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Bumped by every [`ConfigHandle::update`].
    pub version: u64,
    pub shard_dir: PathBuf,
    pub corpus_dir: PathBuf,
    pub max_normalized_variants: usize,
    pub max_normalize_steps: usize,
    pub max_normalize_depth: usize,
    pub max_obfuscated_variants: usize,
    pub max_lookups: usize,
    pub crack_timeout_secs: u64,
    /// Offline-fast crack time below which the crack-time layer flags.
    pub min_crack_seconds: f64,
    pub bulk_max_workers: usize,
    /// Statistical estimation only when absent.
    pub cracker: Option<CrackerConfig>,
    pub composition: CompositionPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            shard_dir: PathBuf::from(DEFAULT_SHARD_DIR),
            corpus_dir: PathBuf::from(DEFAULT_CORPUS_DIR),
            max_normalized_variants: DEFAULT_MAX_NORMALIZED,
            max_normalize_steps: DEFAULT_MAX_STEPS,
            max_normalize_depth: DEFAULT_MAX_DEPTH,
            max_obfuscated_variants: DEFAULT_MAX_OBFUSCATED,
            max_lookups: DEFAULT_MAX_LOOKUPS,
            crack_timeout_secs: DEFAULT_CRACK_TIMEOUT_SECS,
            min_crack_seconds: DEFAULT_MIN_CRACK_SECONDS,
            bulk_max_workers: DEFAULT_BULK_MAX_WORKERS,
            cracker: None,
            composition: CompositionPolicy::default(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overridden by environment variables.
    ///
    /// - `PWD_SHARD_DIR`: shard directory (default `./assets/bloom_filters`)
    /// - `PWD_CORPUS_DIR`: banned term corpus (default `./assets/banned_words`)
    /// - `PWD_CRACK_TIMEOUT_SECS`: cracker timeout in seconds (default 15)
    /// - `PWD_CRACKER_PATH` and `PWD_CRACKER_WORDLIST`: enable the external
    ///   cracker, both must be set
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(SHARD_DIR_ENV) {
            config.shard_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var(CORPUS_DIR_ENV) {
            config.corpus_dir = PathBuf::from(dir);
        }
        if let Ok(secs) = std::env::var(CRACK_TIMEOUT_ENV) {
            config.crack_timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{CRACK_TIMEOUT_ENV} is not a number of seconds: {secs:?}"))
            })?;
        }
        if let (Ok(program), Ok(wordlist)) = (
            std::env::var(CRACKER_PATH_ENV),
            std::env::var(CRACKER_WORDLIST_ENV),
        ) {
            config.cracker = Some(CrackerConfig {
                program: PathBuf::from(program),
                wordlist: PathBuf::from(wordlist),
                args: Vec::new(),
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Reads a JSON document; missing keys take their defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;

        #[cfg(feature = "tracing")]
        tracing::info!("Configuration v{} loaded from {:?}", config.version, path.as_ref());

        Ok(config)
    }

    /// Rejects zero caps, a zero timeout and a negative crack threshold.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let caps = [
            ("max_normalized_variants", self.max_normalized_variants),
            ("max_normalize_steps", self.max_normalize_steps),
            ("max_normalize_depth", self.max_normalize_depth),
            ("max_obfuscated_variants", self.max_obfuscated_variants),
            ("max_lookups", self.max_lookups),
            ("bulk_max_workers", self.bulk_max_workers),
        ];
        if let Some((name, _)) = caps.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
        }
        if self.crack_timeout_secs == 0 {
            return Err(ConfigError::Invalid("crack_timeout_secs must be greater than zero".into()));
        }
        if !(self.min_crack_seconds >= 0.0) {
            return Err(ConfigError::Invalid("min_crack_seconds must be zero or more".into()));
        }
        Ok(())
    }

    pub fn crack_timeout(&self) -> Duration {
        Duration::from_secs(self.crack_timeout_secs)
    }

    pub fn normalize_limits(&self) -> NormalizeLimits {
        NormalizeLimits {
            max_variants: self.max_normalized_variants,
            max_steps: self.max_normalize_steps,
            max_depth: self.max_normalize_depth,
        }
    }

    pub fn lookup_budget(&self) -> LookupBudget {
        LookupBudget {
            max_lookups: self.max_lookups,
            max_obfuscated: self.max_obfuscated_variants,
            normalize: self.normalize_limits(),
        }
    }

    /// The external cracker when configured, the statistical estimator
    /// otherwise.
    pub fn crack_backend(&self) -> CrackBackend {
        match &self.cracker {
            Some(cracker) => CrackBackend::External(
                ExternalCracker::new(&cracker.program, &cracker.wordlist, self.crack_timeout())
                    .with_base_args(cracker.args.iter().cloned()),
            ),
            None => CrackBackend::Statistical(StatisticalEstimator),
        }
    }
}

/// Publishes configuration snapshots.
#[derive(Debug)]
pub struct ConfigHandle {
    current: RwLock<Arc<PipelineConfig>>,
}

impl ConfigHandle {
    pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            current: RwLock::new(Arc::new(config)),
        })
    }

    /// The current snapshot. Later updates do not affect it.
    pub fn snapshot(&self) -> Arc<PipelineConfig> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `change` to a copy of the current snapshot, bumps its version
    /// and publishes it. An invalid result leaves the current snapshot in
    /// place.
    pub fn update<F>(&self, change: F) -> Result<Arc<PipelineConfig>, ConfigError>
    where
        F: FnOnce(&mut PipelineConfig),
    {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = PipelineConfig::clone(&current);
        change(&mut next);
        next.version = current.version + 1;
        next.validate()?;

        let next = Arc::new(next);
        *current = Arc::clone(&next);

        #[cfg(feature = "tracing")]
        tracing::info!("Configuration v{} published", next.version);

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::composition::{Constraint, Feature};
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper to safely set env var in tests
    fn set_env(key: &str, value: &str) {
        // SAFETY: tests touching the environment run under #[serial]
        unsafe { std::env::set_var(key, value); }
    }

    /// Helper to safely remove env var in tests
    fn remove_env(key: &str) {
        // SAFETY: tests touching the environment run under #[serial]
        unsafe { std::env::remove_var(key); }
    }

    fn clear_env() {
        for key in [SHARD_DIR_ENV, CORPUS_DIR_ENV, CRACK_TIMEOUT_ENV, CRACKER_PATH_ENV, CRACKER_WORDLIST_ENV] {
            remove_env(key);
        }
    }

    fn json_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, "{content}").expect("Failed to write");
        file
    }

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.shard_dir, PathBuf::from("./assets/bloom_filters"));
        assert_eq!(config.max_normalized_variants, 4096);
        assert_eq!(config.max_obfuscated_variants, 50);
        assert_eq!(config.crack_timeout(), Duration::from_secs(15));
        assert_eq!(config.min_crack_seconds, 3600.0);
        assert!(config.validate().is_ok());
        assert!(matches!(config.crack_backend(), CrackBackend::Statistical(_)));
    }

    #[test]
    fn test_validate_rejects_zero_caps() {
        let config = PipelineConfig {
            max_lookups: 0,
            ..PipelineConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_lookups"));

        let config = PipelineConfig {
            crack_timeout_secs: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        set_env(SHARD_DIR_ENV, "/srv/shards");
        set_env(CRACK_TIMEOUT_ENV, "3");
        set_env(CRACKER_PATH_ENV, "/usr/bin/john");
        set_env(CRACKER_WORDLIST_ENV, "/srv/weak.txt");

        let config = PipelineConfig::from_env().unwrap();
        assert_eq!(config.shard_dir, PathBuf::from("/srv/shards"));
        assert_eq!(config.corpus_dir, PathBuf::from(DEFAULT_CORPUS_DIR));
        assert_eq!(config.crack_timeout(), Duration::from_secs(3));
        match config.crack_backend() {
            CrackBackend::External(cracker) => {
                assert_eq!(cracker.program, PathBuf::from("/usr/bin/john"));
                assert_eq!(cracker.timeout, Duration::from_secs(3));
            }
            other => panic!("unexpected backend {other:?}"),
        }

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_bad_timeout() {
        clear_env();
        set_env(CRACK_TIMEOUT_ENV, "soon");
        assert!(matches!(PipelineConfig::from_env(), Err(ConfigError::Invalid(_))));
        set_env(CRACK_TIMEOUT_ENV, "0");
        assert!(matches!(PipelineConfig::from_env(), Err(ConfigError::Invalid(_))));
        clear_env();
    }

    #[test]
    #[serial]
    fn test_cracker_needs_both_variables() {
        clear_env();
        set_env(CRACKER_PATH_ENV, "/usr/bin/john");
        let config = PipelineConfig::from_env().unwrap();
        assert!(config.cracker.is_none());
        clear_env();
    }

    #[test]
    fn test_from_json_file_partial() {
        let file = json_file(
            r#"{"max_lookups": 10, "composition": {"length": {"min": 8}}, "cracker": {"program": "john", "wordlist": "w.txt"}}"#,
        );
        let config = PipelineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.max_lookups, 10);
        assert_eq!(config.max_normalized_variants, 4096);
        assert_eq!(config.composition.get(Feature::Length), Some(Constraint::Min(8.0)));
        assert_eq!(config.composition.get(Feature::Entropy), None);
        assert_eq!(config.cracker.unwrap().args, Vec::<String>::new());
    }

    #[test]
    fn test_from_json_file_errors() {
        let file = json_file("{ not json");
        assert!(matches!(PipelineConfig::from_json_file(file.path()), Err(ConfigError::Parse(_))));

        let file = json_file(r#"{"bulk_max_workers": 0}"#);
        assert!(matches!(PipelineConfig::from_json_file(file.path()), Err(ConfigError::Invalid(_))));

        assert!(matches!(
            PipelineConfig::from_json_file("/nonexistent/pwd-risk.json"),
            Err(ConfigError::Io(_))
        ));
    }

    #[test]
    fn test_handle_publishes_new_versions() {
        let handle = ConfigHandle::new(PipelineConfig::default()).unwrap();
        let before = handle.snapshot();

        let after = handle.update(|c| c.max_lookups = 16).unwrap();
        assert_eq!(after.version, before.version + 1);
        assert_eq!(after.max_lookups, 16);
        assert_eq!(before.max_lookups, DEFAULT_MAX_LOOKUPS);
        assert_eq!(handle.snapshot().version, after.version);
    }

    #[test]
    fn test_handle_rejects_invalid_update() {
        let handle = ConfigHandle::new(PipelineConfig::default()).unwrap();
        assert!(handle.update(|c| c.max_lookups = 0).is_err());
        let current = handle.snapshot();
        assert_eq!(current.version, 1);
        assert_eq!(current.max_lookups, DEFAULT_MAX_LOOKUPS);
    }
}
