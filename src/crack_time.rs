//! Crack-time estimation.
//!
//! [`StatisticalEstimator`] converts a guess count into attack durations.
//! [`ExternalCracker`] hashes the password and hands it to a John the
//! Ripper compatible program, falling back to the statistical figures when
//! nothing is cracked in time.

use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use md5::Md5;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tokio::process::Command;

use crate::error::LayerError;
use crate::estimator::MAX_ESTIMATE_CHARS;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Attack scenarios and their guess rates per second.
pub const ATTACK_RATES: [(&str, f64); 4] = [
    ("online_throttling_100_per_hour", 100.0 / 3600.0),
    ("online_no_throttling_10_per_second", 10.0),
    ("offline_slow_hashing_1e4_per_second", 1e4),
    ("offline_fast_hashing_1e10_per_second", 1e10),
];

/// `x.xx days` from one day up, `x.xx sec` below.
pub fn format_duration(seconds: f64) -> String {
    if seconds >= SECONDS_PER_DAY {
        format!("{:.2} days", seconds / SECONDS_PER_DAY)
    } else {
        format!("{seconds:.2} sec")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrackTimeBreakdown {
    pub scenario: String,
    pub seconds: f64,
    pub display: String,
}

/// Guess count and per-scenario durations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticalEstimate {
    pub guesses: f64,
    pub guesses_log10: f64,
    pub breakdown: Vec<CrackTimeBreakdown>,
}

impl StatisticalEstimate {
    pub fn from_guesses(guesses: f64) -> Self {
        let breakdown = ATTACK_RATES
            .iter()
            .map(|(scenario, rate)| {
                let seconds = guesses / rate;
                CrackTimeBreakdown {
                    scenario: scenario.to_string(),
                    seconds,
                    display: format_duration(seconds),
                }
            })
            .collect();
        Self {
            guesses,
            guesses_log10: guesses.log10(),
            breakdown,
        }
    }

    /// Seconds under the fastest offline attack.
    pub fn offline_fast_seconds(&self) -> f64 {
        self.breakdown.last().map_or(0.0, |b| b.seconds)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HashFormat {
    RawMd5,
    RawSha1,
    RawSha256,
    Md5Crypt,
    Sha256Crypt,
    Sha512Crypt,
    Bcrypt,
}

impl HashFormat {
    /// Recognizes raw hex digests by length and crypt hashes by prefix.
    pub fn detect(hash: &str) -> Option<Self> {
        let is_hex = !hash.is_empty() && hash.bytes().all(|b| b.is_ascii_hexdigit());
        if is_hex {
            return match hash.len() {
                32 => Some(HashFormat::RawMd5),
                40 => Some(HashFormat::RawSha1),
                64 => Some(HashFormat::RawSha256),
                _ => None,
            };
        }
        if hash.starts_with("$1$") {
            Some(HashFormat::Md5Crypt)
        } else if hash.starts_with("$5$") {
            Some(HashFormat::Sha256Crypt)
        } else if hash.starts_with("$6$") {
            Some(HashFormat::Sha512Crypt)
        } else if ["$2a$", "$2b$", "$2y$"].iter().any(|p| hash.starts_with(p)) {
            Some(HashFormat::Bcrypt)
        } else {
            None
        }
    }

    /// Name understood by `--format=`.
    pub fn cracker_name(&self) -> &'static str {
        match self {
            HashFormat::RawMd5 => "raw-md5",
            HashFormat::RawSha1 => "raw-sha1",
            HashFormat::RawSha256 => "raw-sha256",
            HashFormat::Md5Crypt => "md5crypt",
            HashFormat::Sha256Crypt => "sha256crypt",
            HashFormat::Sha512Crypt => "sha512crypt",
            HashFormat::Bcrypt => "bcrypt",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrackStatus {
    Cracked,
    NotCracked,
}

/// One hash handed to the cracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashAttempt {
    pub algorithm: String,
    pub hash_format: Option<HashFormat>,
    pub status: CrackStatus,
    /// `wordlist+rules` when cracked, `timeout` or `exhausted` otherwise.
    pub method: String,
    pub elapsed_seconds: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrackTimeReport {
    pub attempts: Vec<HashAttempt>,
    pub statistical: StatisticalEstimate,
    /// True when no attempt cracked the password and the statistical
    /// estimate is the answer.
    pub fallback_used: bool,
}

impl CrackTimeReport {
    pub fn is_cracked(&self) -> bool {
        self.attempts.iter().any(|a| a.status == CrackStatus::Cracked)
    }

    /// Seconds to crack: the fastest successful attempt, or the offline-fast
    /// estimate.
    pub fn estimated_seconds(&self) -> f64 {
        self.attempts
            .iter()
            .filter(|a| a.status == CrackStatus::Cracked)
            .map(|a| a.elapsed_seconds)
            .reduce(f64::min)
            .unwrap_or_else(|| self.statistical.offline_fast_seconds())
    }

    pub fn is_flagged(&self, min_crack_seconds: f64) -> bool {
        self.is_cracked() || self.statistical.offline_fast_seconds() < min_crack_seconds
    }
}

/// Produces a crack-time report for one password.
pub trait CrackTimeEstimator: Send + Sync {
    fn estimate(
        &self,
        password: &SecretString,
    ) -> impl Future<Output = Result<CrackTimeReport, LayerError>> + Send;
}

/// Guess-count based estimate, no hashing involved.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalEstimator;

impl StatisticalEstimator {
    pub fn estimate_now(&self, password: &str) -> StatisticalEstimate {
        let truncated: String = password.chars().take(MAX_ESTIMATE_CHARS).collect();
        let guesses = zxcvbn::zxcvbn(&truncated, &[]).guesses() as f64;
        StatisticalEstimate::from_guesses(guesses)
    }
}

impl CrackTimeEstimator for StatisticalEstimator {
    async fn estimate(&self, password: &SecretString) -> Result<CrackTimeReport, LayerError> {
        Ok(CrackTimeReport {
            attempts: Vec::new(),
            statistical: self.estimate_now(password.expose_secret()),
            fallback_used: true,
        })
    }
}

/// Runs an external cracking program against MD5 and SHA-256 digests of the
/// password.
///
/// Crack run: `<program> <base_args..> <hash file> --wordlist=<wordlist>
/// --format=<format> --rules`, killed once `timeout` elapses. Result query:
/// `<program> <base_args..> --show <hash file> --format=<format>`, bounded by
/// the same timeout.
#[derive(Debug, Clone)]
pub struct ExternalCracker {
    pub program: PathBuf,
    pub base_args: Vec<String>,
    pub wordlist: PathBuf,
    pub timeout: Duration,
}

impl ExternalCracker {
    pub fn new(program: impl Into<PathBuf>, wordlist: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            base_args: Vec::new(),
            wordlist: wordlist.into(),
            timeout,
        }
    }

    pub fn with_base_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.base_args = args.into_iter().map(Into::into).collect();
        self
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.base_args)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        command
    }

    async fn crack_hash(&self, algorithm: &str, hash: &str) -> Result<HashAttempt, LayerError> {
        let Some(format) = HashFormat::detect(hash) else {
            return Err(LayerError::Collaborator(format!(
                "unknown hash format for {algorithm} digest"
            )));
        };

        let mut hash_file = tempfile::NamedTempFile::new()?;
        writeln!(hash_file, "{hash}")?;
        hash_file.flush()?;

        let started = Instant::now();
        let mut child = self
            .command()
            .arg(hash_file.path())
            .arg(format!("--wordlist={}", self.wordlist.display()))
            .arg(format!("--format={}", format.cracker_name()))
            .arg("--rules")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        let finished = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => {
                status?;
                true
            }
            Err(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    "Cracker exceeded {:?} on {} digest, killing it",
                    self.timeout,
                    algorithm
                );
                child.kill().await?;
                false
            }
        };
        let elapsed_seconds = (started.elapsed().as_secs_f64() * 100.0).round() / 100.0;

        let cracked = self.show(hash_file.path(), format).await?;
        let (status, method) = match (cracked, finished) {
            (true, _) => (CrackStatus::Cracked, "wordlist+rules"),
            (false, true) => (CrackStatus::NotCracked, "exhausted"),
            (false, false) => (CrackStatus::NotCracked, "timeout"),
        };

        Ok(HashAttempt {
            algorithm: algorithm.to_string(),
            hash_format: Some(format),
            status,
            method: method.to_string(),
            elapsed_seconds,
        })
    }

    async fn show(&self, hash_file: &Path, format: HashFormat) -> Result<bool, LayerError> {
        let query = self
            .command()
            .arg("--show")
            .arg(hash_file)
            .arg(format!("--format={}", format.cracker_name()))
            .stderr(Stdio::null())
            .output();
        let output = tokio::time::timeout(self.timeout, query)
            .await
            .map_err(|_| LayerError::Timeout(self.timeout))??;

        Ok(parse_show_output(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Whether `--show` output lists a cracked entry (`<id>:<plaintext>`).
fn parse_show_output(stdout: &str) -> bool {
    stdout
        .lines()
        .filter(|line| !line.starts_with("0 password hashes cracked"))
        .filter_map(|line| line.split(':').nth(1))
        .any(|plain| !plain.trim().is_empty())
}

impl CrackTimeEstimator for ExternalCracker {
    async fn estimate(&self, password: &SecretString) -> Result<CrackTimeReport, LayerError> {
        let pwd = password.expose_secret();
        let digests = [
            ("md5", hex::encode(Md5::digest(pwd.as_bytes()))),
            ("sha256", hex::encode(Sha256::digest(pwd.as_bytes()))),
        ];

        let mut attempts = Vec::with_capacity(digests.len());
        for (algorithm, hash) in &digests {
            attempts.push(self.crack_hash(algorithm, hash).await?);
        }

        let statistical = StatisticalEstimator.estimate_now(pwd);
        let fallback_used = !attempts.iter().any(|a| a.status == CrackStatus::Cracked);

        Ok(CrackTimeReport {
            attempts,
            statistical,
            fallback_used,
        })
    }
}

/// Estimator chosen at configuration time.
#[derive(Debug, Clone)]
pub enum CrackBackend {
    Statistical(StatisticalEstimator),
    External(ExternalCracker),
}

impl Default for CrackBackend {
    fn default() -> Self {
        CrackBackend::Statistical(StatisticalEstimator)
    }
}

impl CrackTimeEstimator for CrackBackend {
    async fn estimate(&self, password: &SecretString) -> Result<CrackTimeReport, LayerError> {
        match self {
            CrackBackend::Statistical(estimator) => estimator.estimate(password).await,
            CrackBackend::External(cracker) => cracker.estimate(password).await,
        }
    }
}


#[cfg(all(test, unix))]
mod process_tests {
    use super::*;

    fn script_cracker(script: &str, timeout: Duration) -> ExternalCracker {
        ExternalCracker::new("sh", "/dev/null", timeout).with_base_args(["-c", script, "cracker"])
    }

    fn secret(pwd: &str) -> SecretString {
        SecretString::new(pwd.to_string().into())
    }

    #[tokio::test]
    async fn test_cracked_by_wordlist() {
        let cracker = script_cracker(
            r#"case "$1" in --show) echo "?:hunter2"; echo "1 password hash cracked, 0 left";; *) exit 0;; esac"#,
            Duration::from_secs(5),
        );
        let report = cracker.estimate(&secret("hunter2")).await.unwrap();

        assert_eq!(report.attempts.len(), 2);
        assert!(report.is_cracked());
        assert!(!report.fallback_used);
        assert_eq!(report.attempts[0].algorithm, "md5");
        assert_eq!(report.attempts[0].hash_format, Some(HashFormat::RawMd5));
        assert_eq!(report.attempts[1].hash_format, Some(HashFormat::RawSha256));
        assert_eq!(report.attempts[0].method, "wordlist+rules");
    }

    #[tokio::test]
    async fn test_not_cracked_falls_back() {
        let cracker = script_cracker(
            r#"case "$1" in --show) echo "0 password hashes cracked, 1 left";; *) exit 0;; esac"#,
            Duration::from_secs(5),
        );
        let report = cracker.estimate(&secret("Tr0ub4dour&3-horse")).await.unwrap();

        assert!(!report.is_cracked());
        assert!(report.fallback_used);
        assert!(report.attempts.iter().all(|a| a.method == "exhausted"));
    }

    #[tokio::test]
    async fn test_slow_cracker_is_killed() {
        let cracker = script_cracker(
            r#"case "$1" in --show) echo "0 password hashes cracked, 1 left";; *) exec sleep 5;; esac"#,
            Duration::from_millis(200),
        );
        let started = Instant::now();
        let report = cracker.estimate(&secret("password")).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(report.fallback_used);
        assert!(report.attempts.iter().all(|a| a.method == "timeout"));
    }

    #[tokio::test]
    async fn test_hanging_show_is_a_timeout() {
        let cracker = script_cracker(
            r#"case "$1" in --show) exec sleep 5;; *) exit 0;; esac"#,
            Duration::from_millis(200),
        );
        let result = cracker.estimate(&secret("password")).await;
        assert!(matches!(result, Err(LayerError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_missing_program_is_an_io_error() {
        let cracker = ExternalCracker::new(
            "/nonexistent/cracker-binary",
            "/dev/null",
            Duration::from_secs(1),
        );
        let result = cracker.estimate(&secret("password")).await;
        assert!(matches!(result, Err(LayerError::Io(_))));
    }
}
