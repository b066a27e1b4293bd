//! Breach membership index.
//!
//! Credentials are bucketed by the first byte of their SHA-256 digest into
//! 256 independent Bloom filter shards. Shards load lazily on first access
//! and stay cached for the lifetime of the index. A shard that is missing or
//! fails validation counts as empty: the lookup answers "no match" instead of
//! failing the request.

mod bloom;
mod shard;

pub use bloom::{BloomFilter, CandidateDigest, DEFAULT_FALSE_POSITIVE_RATE};
pub use shard::{
    read_shard, shard_file_name, write_shard, BuildSummary, ShardBuilder, ShardError, ShardHeader,
    SHARD_FORMAT_VERSION, SHARD_MAGIC,
};

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::variants::{self, NormalizeLimits, DEFAULT_MAX_OBFUSCATED};

const SHARD_COUNT: usize = 256;

/// Default cap on digest lookups per password.
pub const DEFAULT_MAX_LOOKUPS: usize = 2048;

/// Per-request work bounds for [`MembershipIndex::check_compromised`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookupBudget {
    /// Digest lookups across all stages.
    pub max_lookups: usize,
    /// Obfuscated variants generated in the last stage.
    pub max_obfuscated: usize,
    pub normalize: NormalizeLimits,
}

impl Default for LookupBudget {
    fn default() -> Self {
        Self {
            max_lookups: DEFAULT_MAX_LOOKUPS,
            max_obfuscated: DEFAULT_MAX_OBFUSCATED,
            normalize: NormalizeLimits::default(),
        }
    }
}

/// Which pass produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStage {
    Direct,
    Normalized,
    Obfuscated,
}

/// Outcome of a breach check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompromiseCheck {
    pub found: bool,
    pub matched_variant: Option<String>,
    /// Two-hex-character shard of the match.
    pub shard: Option<String>,
    pub stage: Option<MatchStage>,
    /// Digest lookups performed.
    pub lookups: usize,
    /// The budget or a generator cap ended the search early.
    pub truncated: bool,
}

/// Lazily loaded set of shards under one directory.
#[derive(Debug)]
pub struct MembershipIndex {
    dir: PathBuf,
    shards: Vec<OnceLock<Option<BloomFilter>>>,
}

impl MembershipIndex {
    /// Opens the index rooted at `dir`. Nothing is read until a lookup.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            shards: (0..SHARD_COUNT).map(|_| OnceLock::new()).collect(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether `candidate` is possibly in the breach set.
    pub fn contains(&self, candidate: &str) -> bool {
        self.contains_digest(&CandidateDigest::of(candidate))
    }

    pub fn contains_digest(&self, digest: &CandidateDigest) -> bool {
        self.shard(digest.shard_prefix())
            .is_some_and(|filter| filter.contains_digest(digest))
    }

    /// Number of shards read from disk so far, absent ones included.
    pub fn loaded_shards(&self) -> usize {
        self.shards.iter().filter(|slot| slot.get().is_some()).count()
    }

    fn shard(&self, prefix: u8) -> Option<&BloomFilter> {
        self.shards[usize::from(prefix)]
            .get_or_init(|| self.load(prefix))
            .as_ref()
    }

    fn load(&self, prefix: u8) -> Option<BloomFilter> {
        let path = self.dir.join(shard_file_name(prefix));
        if !path.exists() {
            #[cfg(feature = "tracing")]
            tracing::debug!("Shard {:02x} absent at {:?}", prefix, path);
            return None;
        }

        match read_shard(&path, prefix) {
            Ok((_header, filter)) => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    "Shard {:02x} loaded: {} entries, fpr {}",
                    prefix,
                    _header.entries,
                    _header.false_positive_rate
                );
                Some(filter)
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Shard {:02x} unusable, treated as empty: {}", prefix, _e);
                None
            }
        }
    }

    /// Searches the index for `password` and its leet variants.
    ///
    /// Passes, in order, each candidate tested at most once:
    /// 1. the password as given;
    /// 2. every normalized variant of the lowercased password;
    /// 3. obfuscated variants of the lowercased password.
    ///
    /// Stops at the first hit. Running out of `budget.max_lookups` stops the
    /// search and marks the result truncated.
    pub fn check_compromised(&self, password: &str, budget: &LookupBudget) -> CompromiseCheck {
        let mut search = Search {
            index: self,
            tested: HashSet::new(),
            check: CompromiseCheck::default(),
            max_lookups: budget.max_lookups,
        };

        if search.probe(password, MatchStage::Direct) {
            return search.check;
        }

        let lowered = password.to_lowercase();
        let normalized = variants::normalize_with(
            &lowered,
            crate::leet::SubstitutionTable::standard(),
            budget.normalize,
        );
        search.check.truncated |= normalized.is_truncated();
        for variant in normalized.iter() {
            if search.probe(variant, MatchStage::Normalized) {
                return search.check;
            }
        }

        let mut obfuscated = variants::obfuscate(&lowered, budget.max_obfuscated);
        for variant in obfuscated.by_ref() {
            if search.probe(&variant, MatchStage::Obfuscated) {
                return search.check;
            }
        }
        search.check.truncated |= obfuscated.truncated();

        #[cfg(feature = "tracing")]
        tracing::debug!(
            "Breach check clear after {} lookups (truncated: {})",
            search.check.lookups,
            search.check.truncated
        );

        search.check
    }
}

struct Search<'i> {
    index: &'i MembershipIndex,
    tested: HashSet<String>,
    check: CompromiseCheck,
    max_lookups: usize,
}

impl Search<'_> {
    /// Tests one candidate; true once a match is recorded or the budget is gone.
    fn probe(&mut self, candidate: &str, stage: MatchStage) -> bool {
        if self.check.lookups >= self.max_lookups {
            self.check.truncated = true;
            return true;
        }
        if !self.tested.insert(candidate.to_string()) {
            return false;
        }

        self.check.lookups += 1;
        let digest = CandidateDigest::of(candidate);
        if self.index.contains_digest(&digest) {
            self.check.found = true;
            self.check.matched_variant = Some(candidate.to_string());
            self.check.shard = Some(format!("{:02x}", digest.shard_prefix()));
            self.check.stage = Some(stage);
            return true;
        }
        false
    }
}
