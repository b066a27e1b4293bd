//! Password evaluation sections
//!
//! Each section analyzes a specific aspect of password strength.

mod corpus;
mod length;
mod pattern;
mod variety;

pub use corpus::corpus_section;
pub use length::length_section;
pub use pattern::pattern_analysis_section;
pub use variety::character_variety_section;
pub(crate) use variety::class_count;

use crate::corpus::BannedTermCorpus;

/// Result type for section evaluation functions.
/// - `Ok(Some(reason))` - Section failed with reason
/// - `Ok(None)` - Section passed
/// - `Err(())` - Fatal error during evaluation
pub type SectionResult = Result<Option<String>, ()>;

/// Shared state a section may consult.
#[derive(Debug, Clone, Copy)]
pub struct SectionContext<'a> {
    pub corpus: &'a BannedTermCorpus,
}

pub type Section = fn(&secrecy::SecretString, &SectionContext<'_>) -> SectionResult;
