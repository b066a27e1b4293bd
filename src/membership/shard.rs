//! On-disk shard format and the offline shard builder.
//!
//! One file per digest prefix, `bloom_<prefix>.bin`, bincode-encoded:
//! header, filter words, then a checksum over the words. Files are written
//! to a temporary sibling and renamed into place, so readers never see a
//! partial shard.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use thiserror::Error;

use super::bloom::{BloomFilter, CandidateDigest, DEFAULT_FALSE_POSITIVE_RATE};

pub const SHARD_MAGIC: [u8; 4] = *b"PWRB";
pub const SHARD_FORMAT_VERSION: u16 = 1;

#[derive(Error, Debug)]
pub enum ShardError {
    #[error("shard i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("shard could not be decoded: {0}")]
    Decode(#[from] bincode::Error),
    #[error("shard is corrupt: {0}")]
    Corrupt(String),
    #[error("invalid shard parameters: {0}")]
    InvalidParameters(String),
}

/// Metadata stored in front of the filter words.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardHeader {
    pub magic: [u8; 4],
    pub version: u16,
    pub prefix: u8,
    pub entries: u64,
    pub false_positive_rate: f64,
    pub hash_count: u32,
    pub bit_count: u64,
}

#[derive(Serialize, Deserialize)]
struct ShardFile {
    header: ShardHeader,
    words: Vec<u64>,
    checksum: u64,
}

pub fn shard_file_name(prefix: u8) -> String {
    format!("bloom_{prefix:02x}.bin")
}

fn checksum(words: &[u64]) -> u64 {
    let mut hasher = Sha256::new();
    for word in words {
        hasher.update(word.to_le_bytes());
    }
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(head)
}

/// Writes one shard atomically and returns its final path.
pub fn write_shard(
    dir: &Path,
    prefix: u8,
    filter: &BloomFilter,
    entries: u64,
    false_positive_rate: f64,
) -> Result<PathBuf, ShardError> {
    let file = ShardFile {
        header: ShardHeader {
            magic: SHARD_MAGIC,
            version: SHARD_FORMAT_VERSION,
            prefix,
            entries,
            false_positive_rate,
            hash_count: filter.hash_count(),
            bit_count: filter.bit_count(),
        },
        words: filter.words().to_vec(),
        checksum: checksum(filter.words()),
    };

    let target = dir.join(shard_file_name(prefix));
    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        bincode::serialize_into(&mut writer, &file)?;
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(&target).map_err(|e| ShardError::Io(e.error))?;

    Ok(target)
}

/// Reads and validates a shard that must belong to `expected_prefix`.
pub fn read_shard(path: &Path, expected_prefix: u8) -> Result<(ShardHeader, BloomFilter), ShardError> {
    let bytes = fs::read(path)?;
    let file: ShardFile = bincode::deserialize(&bytes)?;
    let header = file.header;

    if header.magic != SHARD_MAGIC {
        return Err(ShardError::Corrupt("bad magic".into()));
    }
    if header.version != SHARD_FORMAT_VERSION {
        return Err(ShardError::Corrupt(format!(
            "unsupported format version {}",
            header.version
        )));
    }
    if header.prefix != expected_prefix {
        return Err(ShardError::Corrupt(format!(
            "prefix {:02x} stored in shard {:02x}",
            header.prefix, expected_prefix
        )));
    }
    if checksum(&file.words) != file.checksum {
        return Err(ShardError::Corrupt("checksum mismatch".into()));
    }

    let filter = BloomFilter::from_parts(file.words, header.bit_count, header.hash_count)
        .ok_or_else(|| ShardError::Corrupt("inconsistent filter geometry".into()))?;

    Ok((header, filter))
}

/// What a [`ShardBuilder::write`] produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub entries: u64,
    pub paths: Vec<PathBuf>,
}

/// Buckets credentials by digest prefix and writes one sized shard per bucket.
///
/// Prefixes that received no credential get no file; a missing shard reads
/// as "no match".
#[derive(Debug, Clone)]
pub struct ShardBuilder {
    false_positive_rate: f64,
    buckets: BTreeMap<u8, BTreeSet<CandidateDigest>>,
}

impl Default for ShardBuilder {
    fn default() -> Self {
        Self {
            false_positive_rate: DEFAULT_FALSE_POSITIVE_RATE,
            buckets: BTreeMap::new(),
        }
    }
}

impl ShardBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_false_positive_rate(mut self, rate: f64) -> Result<Self, ShardError> {
        if !(rate > 0.0 && rate < 1.0) {
            return Err(ShardError::InvalidParameters(format!(
                "false-positive rate must lie in (0, 1), got {rate}"
            )));
        }
        self.false_positive_rate = rate;
        Ok(self)
    }

    pub fn insert(&mut self, credential: &str) {
        let digest = CandidateDigest::of(credential);
        self.buckets
            .entry(digest.shard_prefix())
            .or_default()
            .insert(digest);
    }

    pub fn extend<I, S>(&mut self, credentials: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for credential in credentials {
            self.insert(credential.as_ref());
        }
    }

    /// Adds every non-empty line of a plain-text credential dump.
    ///
    /// Lines are trimmed of their line terminator only; case is kept.
    /// Returns the number of lines added.
    pub fn add_wordlist(&mut self, path: &Path) -> Result<usize, ShardError> {
        let reader = BufReader::new(fs::File::open(path)?);
        let mut added = 0;
        for line in reader.split(b'\n') {
            let line = line?;
            let line = String::from_utf8_lossy(&line);
            let credential = line.trim_end_matches(['\r', '\n']);
            if credential.is_empty() {
                continue;
            }
            self.insert(credential);
            added += 1;
        }
        Ok(added)
    }

    /// Distinct credentials collected so far.
    pub fn len(&self) -> usize {
        self.buckets.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn write(&self, dir: &Path) -> Result<BuildSummary, ShardError> {
        fs::create_dir_all(dir)?;
        let mut summary = BuildSummary::default();

        for (&prefix, digests) in &self.buckets {
            let mut filter = BloomFilter::with_rate(digests.len(), self.false_positive_rate);
            for digest in digests {
                filter.insert_digest(digest);
            }
            let entries = digests.len() as u64;
            let path = write_shard(dir, prefix, &filter, entries, self.false_positive_rate)?;

            #[cfg(feature = "tracing")]
            tracing::debug!("Shard {:02x} written: {} entries to {:?}", prefix, entries, path);

            summary.entries += entries;
            summary.paths.push(path);
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Membership shards built: {} shards, {} entries in {:?}",
            summary.paths.len(),
            summary.entries,
            dir
        );

        Ok(summary)
    }
}
