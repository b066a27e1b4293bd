//! Digest-keyed Bloom filter.

use sha2::{Digest, Sha256};

/// False-positive rate shards are built for unless told otherwise (0.1%).
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.001;

const MAX_HASH_COUNT: u32 = 32;
const MIN_BIT_COUNT: u64 = 64;

/// SHA-256 digest of a candidate string.
///
/// The first byte selects the shard, the following sixteen seed the probe
/// sequence, so one digest serves both purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CandidateDigest([u8; 32]);

impl CandidateDigest {
    pub fn of(candidate: &str) -> Self {
        Self(Sha256::digest(candidate.as_bytes()).into())
    }

    pub fn shard_prefix(&self) -> u8 {
        self.0[0]
    }

    /// Full digest as lowercase hex.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    fn probe_seeds(&self) -> (u64, u64) {
        let mut first = [0u8; 8];
        let mut second = [0u8; 8];
        first.copy_from_slice(&self.0[8..16]);
        second.copy_from_slice(&self.0[16..24]);
        // Odd step so consecutive probes never collapse onto one bit.
        (u64::from_le_bytes(first), u64::from_le_bytes(second) | 1)
    }
}

/// Bit vector with `k` probes per entry.
///
/// A clear probe bit proves absence; all bits set means "possibly present".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BloomFilter {
    bits: Vec<u64>,
    bit_count: u64,
    hash_count: u32,
}

impl BloomFilter {
    /// Sizes a filter for `expected_entries` at `false_positive_rate`.
    ///
    /// `m = ceil(-n ln p / ln²2)` bits and `k = round(m/n ln 2)` probes.
    /// A rate outside `(0, 1)` falls back to [`DEFAULT_FALSE_POSITIVE_RATE`].
    pub fn with_rate(expected_entries: usize, false_positive_rate: f64) -> Self {
        let rate = if false_positive_rate > 0.0 && false_positive_rate < 1.0 {
            false_positive_rate
        } else {
            DEFAULT_FALSE_POSITIVE_RATE
        };
        let n = expected_entries.max(1) as f64;
        let ln2 = std::f64::consts::LN_2;

        let bit_count = ((-n * rate.ln()) / (ln2 * ln2)).ceil().max(MIN_BIT_COUNT as f64) as u64;
        let hash_count = ((bit_count as f64 / n) * ln2)
            .round()
            .clamp(1.0, MAX_HASH_COUNT as f64) as u32;

        Self {
            bits: vec![0u64; word_count(bit_count)],
            bit_count,
            hash_count,
        }
    }

    /// Rebuilds a filter from stored parts, rejecting inconsistent geometry.
    pub fn from_parts(bits: Vec<u64>, bit_count: u64, hash_count: u32) -> Option<Self> {
        if bit_count == 0
            || hash_count == 0
            || hash_count > MAX_HASH_COUNT
            || bits.len() != word_count(bit_count)
        {
            return None;
        }
        Some(Self {
            bits,
            bit_count,
            hash_count,
        })
    }

    pub fn insert(&mut self, candidate: &str) {
        self.insert_digest(&CandidateDigest::of(candidate));
    }

    pub fn insert_digest(&mut self, digest: &CandidateDigest) {
        for bit in self.probes(digest) {
            self.bits[(bit / 64) as usize] |= 1u64 << (bit % 64);
        }
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.contains_digest(&CandidateDigest::of(candidate))
    }

    #[inline]
    pub fn contains_digest(&self, digest: &CandidateDigest) -> bool {
        self.probes(digest)
            .all(|bit| self.bits[(bit / 64) as usize] & (1u64 << (bit % 64)) != 0)
    }

    pub fn words(&self) -> &[u64] {
        &self.bits
    }

    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    pub fn hash_count(&self) -> u32 {
        self.hash_count
    }

    fn probes(&self, digest: &CandidateDigest) -> impl Iterator<Item = u64> + use<> {
        let (h1, h2) = digest.probe_seeds();
        let bit_count = self.bit_count;
        (0..u64::from(self.hash_count)).map(move |i| h1.wrapping_add(i.wrapping_mul(h2)) % bit_count)
    }
}

fn word_count(bit_count: u64) -> usize {
    bit_count.div_ceil(64) as usize
}
