//! Banned term corpus
//!
//! Terms live in an append-only directory of immutable segment files
//! (`banned_words_<n>.txt`, one term per line). Loading never fails: a missing
//! directory or unreadable segment contributes nothing. The only write path
//! creates a brand-new segment.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::estimator::{RankedDictionary, BANNED_WORDS};

pub const CORPUS_DIR_ENV: &str = "PWD_CORPUS_DIR";
pub const DEFAULT_CORPUS_DIR: &str = "./assets/banned_words";

const SEGMENT_PREFIX: &str = "banned_words_";
const SEGMENT_SUFFIX: &str = ".txt";

#[derive(Error, Debug)]
pub enum CorpusError {
    #[error("Corpus directory not found: {0}")]
    DirectoryNotFound(PathBuf),
    #[error("Failed to read or write corpus segment: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Segment would contain no terms")]
    EmptySegment,
    #[error("Segment already exists: {0}")]
    SegmentExists(PathBuf),
}

/// Returns the corpus directory.
///
/// Priority:
/// 1. Environment variable `PWD_CORPUS_DIR`
/// 2. Default path `./assets/banned_words`
pub fn get_corpus_dir() -> PathBuf {
    std::env::var(CORPUS_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CORPUS_DIR))
}

/// One segment file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentInfo {
    pub index: u32,
    pub path: PathBuf,
    pub terms: usize,
}

pub fn segment_file_name(index: u32) -> String {
    format!("{SEGMENT_PREFIX}{index}{SEGMENT_SUFFIX}")
}

fn parse_segment_index(name: &str) -> Option<u32> {
    name.strip_prefix(SEGMENT_PREFIX)?
        .strip_suffix(SEGMENT_SUFFIX)?
        .parse()
        .ok()
}

/// Segment files under `dir`, sorted by index.
pub fn list_segments(dir: &Path) -> Result<Vec<(u32, PathBuf)>, CorpusError> {
    if !dir.is_dir() {
        return Err(CorpusError::DirectoryNotFound(dir.to_path_buf()));
    }
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if let Some(index) = name.to_str().and_then(parse_segment_index) {
            segments.push((index, entry.path()));
        }
    }
    segments.sort_by_key(|(index, _)| *index);
    Ok(segments)
}

fn normalize_term(raw: &str) -> Option<String> {
    let term = raw.trim().to_lowercase();
    (!term.is_empty()).then_some(term)
}

/// Term → segment that first provided it.
#[derive(Debug, Clone)]
pub struct BannedTermCorpus {
    provenance: BTreeMap<String, String>,
    segments: Vec<SegmentInfo>,
    dictionary: RankedDictionary,
}

impl Default for BannedTermCorpus {
    fn default() -> Self {
        Self::empty()
    }
}

impl BannedTermCorpus {
    pub fn empty() -> Self {
        Self::from_ordered(BTreeMap::new(), Vec::new(), Vec::new())
    }

    /// Loads the corpus from `PWD_CORPUS_DIR` (or the default directory).
    pub fn from_env() -> Self {
        Self::load(get_corpus_dir())
    }

    /// Loads every segment under `dir` in index order.
    ///
    /// Missing directories and unreadable segments are skipped.
    pub fn load<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        let listed = match list_segments(dir) {
            Ok(listed) => listed,
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("Banned term corpus unavailable, using empty corpus: {}", _e);
                return Self::empty();
            }
        };

        let mut provenance = BTreeMap::new();
        let mut ordered = Vec::new();
        let mut segments = Vec::new();

        for (index, path) in listed {
            let content = match fs::read_to_string(&path) {
                Ok(content) => content,
                Err(_e) => {
                    #[cfg(feature = "tracing")]
                    tracing::warn!("Skipping unreadable corpus segment {:?}: {}", path, _e);
                    continue;
                }
            };

            let name = segment_file_name(index);
            let mut count = 0;
            for term in content.lines().filter_map(normalize_term) {
                count += 1;
                if !provenance.contains_key(&term) {
                    provenance.insert(term.clone(), name.clone());
                    ordered.push(term);
                }
            }
            segments.push(SegmentInfo {
                index,
                path,
                terms: count,
            });
        }

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Banned term corpus loaded: {} terms from {} segments in {:?}",
            provenance.len(),
            segments.len(),
            dir
        );

        Self::from_ordered(provenance, ordered, segments)
    }

    /// In-memory corpus attributed to a single named source.
    pub fn from_terms<I, S>(source: &str, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut provenance = BTreeMap::new();
        let mut ordered = Vec::new();
        for term in terms.into_iter().filter_map(|t| normalize_term(t.as_ref())) {
            if !provenance.contains_key(&term) {
                provenance.insert(term.clone(), source.to_string());
                ordered.push(term);
            }
        }
        Self::from_ordered(provenance, ordered, Vec::new())
    }

    fn from_ordered(
        provenance: BTreeMap<String, String>,
        ordered: Vec<String>,
        segments: Vec<SegmentInfo>,
    ) -> Self {
        Self {
            dictionary: RankedDictionary::from_ordered(BANNED_WORDS, &ordered),
            provenance,
            segments,
        }
    }

    pub fn contains(&self, term: &str) -> bool {
        self.provenance.contains_key(&term.to_lowercase())
    }

    /// Segment (or source) that first provided `term`.
    pub fn provenance(&self, term: &str) -> Option<&str> {
        self.provenance.get(&term.to_lowercase()).map(String::as_str)
    }

    pub fn terms(&self) -> impl Iterator<Item = &str> {
        self.provenance.keys().map(String::as_str)
    }

    pub fn segments(&self) -> &[SegmentInfo] {
        &self.segments
    }

    /// Terms ranked by load order, for the estimator.
    pub fn dictionary(&self) -> &RankedDictionary {
        &self.dictionary
    }

    pub fn len(&self) -> usize {
        self.provenance.len()
    }

    pub fn is_empty(&self) -> bool {
        self.provenance.is_empty()
    }
}

/// Writes `terms` as a new segment with the next free index.
///
/// Terms are trimmed, lowercased and deduplicated. A missing `dir` is
/// created. The segment is written to a temporary file and moved into place
/// only when complete, so a concurrent [`BannedTermCorpus::load`] never sees
/// a partial segment. Existing segments are never touched: an append that
/// raced to the same index fails with [`CorpusError::SegmentExists`] instead
/// of overwriting.
pub fn append_segment<I, S>(dir: &Path, terms: I) -> Result<SegmentInfo, CorpusError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut unique = std::collections::BTreeSet::new();
    let mut delta = Vec::new();
    for term in terms.into_iter().filter_map(|t| normalize_term(t.as_ref())) {
        if unique.insert(term.clone()) {
            delta.push(term);
        }
    }
    if delta.is_empty() {
        return Err(CorpusError::EmptySegment);
    }

    fs::create_dir_all(dir)?;
    let index = list_segments(dir)?
        .last()
        .map(|(index, _)| index + 1)
        .unwrap_or(1);
    let path = dir.join(segment_file_name(index));

    let mut tmp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(tmp.as_file_mut());
        for term in &delta {
            writeln!(writer, "{term}")?;
        }
        writer.flush()?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist_noclobber(&path).map_err(|e| match e.error.kind() {
        std::io::ErrorKind::AlreadyExists => CorpusError::SegmentExists(path.clone()),
        _ => CorpusError::ReadError(e.error),
    })?;

    #[cfg(feature = "tracing")]
    tracing::info!("Corpus segment created: {:?} with {} terms", path, delta.len());

    Ok(SegmentInfo {
        index,
        path,
        terms: delta.len(),
    })
}

/// Imports a plain word list (one term per line) as a new segment.
///
/// Invalid UTF-8 is replaced rather than rejected, since public leak lists
/// routinely contain it.
pub fn import_wordlist(dir: &Path, wordlist: &Path) -> Result<SegmentInfo, CorpusError> {
    let bytes = fs::read(wordlist)?;
    let content = String::from_utf8_lossy(&bytes);
    append_segment(dir, content.lines())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

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

    #[test]
    #[serial]
    fn test_get_corpus_dir_default() {
        remove_env(CORPUS_DIR_ENV);
        assert_eq!(get_corpus_dir(), PathBuf::from(DEFAULT_CORPUS_DIR));
    }

    #[test]
    #[serial]
    fn test_get_corpus_dir_from_env() {
        set_env(CORPUS_DIR_ENV, "/custom/corpus");
        assert_eq!(get_corpus_dir(), PathBuf::from("/custom/corpus"));
        remove_env(CORPUS_DIR_ENV);
    }

    #[test]
    #[serial]
    fn test_from_env_loads_configured_directory() {
        let dir = tempdir().expect("Failed to create temp dir");
        append_segment(dir.path(), ["acme"]).expect("Failed to append");
        set_env(CORPUS_DIR_ENV, dir.path().to_str().unwrap());

        let corpus = BannedTermCorpus::from_env();
        assert!(corpus.contains("ACME"));

        remove_env(CORPUS_DIR_ENV);
    }

    #[test]
    fn test_missing_directory_loads_empty() {
        let corpus = BannedTermCorpus::load("/nonexistent/pwd-risk/corpus");
        assert!(corpus.is_empty());
        assert!(corpus.dictionary().is_empty());
    }

    #[test]
    fn test_append_creates_sequential_segments() {
        let dir = tempdir().expect("Failed to create temp dir");

        let first = append_segment(dir.path(), ["Summer", " winter ", "summer", ""])
            .expect("Failed to append first segment");
        assert_eq!(first.index, 1);
        assert_eq!(first.terms, 2);
        assert_eq!(first.path, dir.path().join("banned_words_1.txt"));

        let second = append_segment(dir.path(), ["acme", "winter"]).expect("Failed to append");
        assert_eq!(second.index, 2);

        let corpus = BannedTermCorpus::load(dir.path());
        assert_eq!(corpus.len(), 3);
        assert_eq!(corpus.provenance("winter"), Some("banned_words_1.txt"));
        assert_eq!(corpus.provenance("ACME"), Some("banned_words_2.txt"));
        assert_eq!(corpus.segments().len(), 2);
        assert_eq!(corpus.dictionary().rank("summer"), Some(1));
        assert_eq!(corpus.dictionary().rank("acme"), Some(3));
    }

    #[test]
    fn test_append_never_overwrites_existing_segment() {
        let dir = tempdir().expect("Failed to create temp dir");
        append_segment(dir.path(), ["one"]).expect("Failed to append");
        let before = fs::read_to_string(dir.path().join("banned_words_1.txt")).unwrap();

        append_segment(dir.path(), ["two"]).expect("Failed to append");
        let after = fs::read_to_string(dir.path().join("banned_words_1.txt")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_append_after_gap_uses_max_index() {
        let dir = tempdir().expect("Failed to create temp dir");
        fs::write(dir.path().join("banned_words_7.txt"), "seven\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored\n").unwrap();

        let info = append_segment(dir.path(), ["eight"]).expect("Failed to append");
        assert_eq!(info.index, 8);

        let corpus = BannedTermCorpus::load(dir.path());
        assert!(!corpus.contains("ignored"));
    }

    #[test]
    fn test_empty_delta_is_rejected() {
        let dir = tempdir().expect("Failed to create temp dir");
        let result = append_segment(dir.path(), ["   ", ""]);
        assert!(matches!(result, Err(CorpusError::EmptySegment)));
        assert!(list_segments(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_append_creates_missing_directory() {
        let root = tempdir().expect("Failed to create temp dir");
        let dir = root.path().join("nested").join("banned_words");

        let info = append_segment(&dir, ["acme"]).expect("Failed to append");
        assert_eq!(info.index, 1);
        assert!(dir.join("banned_words_1.txt").is_file());
        assert!(BannedTermCorpus::load(&dir).contains("acme"));
    }

    #[test]
    fn test_append_leaves_only_complete_segments() {
        let dir = tempdir().expect("Failed to create temp dir");
        append_segment(dir.path(), ["alpha", "beta"]).unwrap();
        append_segment(dir.path(), ["gamma"]).unwrap();

        let names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2, "unexpected files: {names:?}");
        assert_eq!(
            fs::read_to_string(dir.path().join("banned_words_1.txt")).unwrap(),
            "alpha\nbeta\n"
        );
    }

    #[test]
    fn test_import_wordlist() {
        let dir = tempdir().expect("Failed to create temp dir");
        let list = dir.path().join("rockyou-sample.txt");
        fs::write(&list, b"Dragon\r\nmonkey\n\xff\xfebad\n").unwrap();

        let info = import_wordlist(dir.path(), &list).expect("Failed to import");
        assert_eq!(info.terms, 3);

        let corpus = BannedTermCorpus::load(dir.path());
        assert!(corpus.contains("dragon"));
        assert!(corpus.contains("monkey"));
    }

    #[test]
    fn test_unreadable_segment_is_skipped() {
        let dir = tempdir().expect("Failed to create temp dir");
        append_segment(dir.path(), ["good"]).unwrap();
        fs::write(dir.path().join("banned_words_2.txt"), b"\xff\xfe\xfd").unwrap();

        let corpus = BannedTermCorpus::load(dir.path());
        assert!(corpus.contains("good"));
        assert_eq!(corpus.segments().len(), 1);
    }
}
