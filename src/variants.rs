//! Variant generation.
//!
//! `normalize` collapses leet tokens back to plain letters by backtracking,
//! `obfuscate` expands plain letters into leet forms as a lazy cartesian
//! product. Both are pure functions of their input and bounded by hard caps.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::leet::SubstitutionTable;

/// Default cap on normalized variants per password.
pub const DEFAULT_MAX_NORMALIZED: usize = 4096;

/// Default cap on recursion steps of one normalization.
pub const DEFAULT_MAX_STEPS: usize = 65_536;

/// Characters past this depth are carried over verbatim.
pub const DEFAULT_MAX_DEPTH: usize = 128;

/// Default cap on obfuscated variants (plain → leet).
pub const DEFAULT_MAX_OBFUSCATED: usize = 50;

/// Hard bounds for [`normalize_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeLimits {
    /// Maximum number of distinct variants collected.
    pub max_variants: usize,
    /// Maximum number of recursive calls, duplicates included.
    pub max_steps: usize,
    /// Maximum number of input characters eligible for substitution.
    pub max_depth: usize,
}

impl Default for NormalizeLimits {
    fn default() -> Self {
        Self {
            max_variants: DEFAULT_MAX_NORMALIZED,
            max_steps: DEFAULT_MAX_STEPS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Candidate strings derived from one password.
///
/// Iteration order is lexicographic. `is_truncated` tells whether a cap cut
/// the generation short, in which case the set may be incomplete.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VariantSet {
    variants: BTreeSet<String>,
    truncated: bool,
}

impl VariantSet {
    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn contains(&self, candidate: &str) -> bool {
        self.variants.contains(candidate)
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.variants.iter().map(String::as_str)
    }

    pub fn into_inner(self) -> BTreeSet<String> {
        self.variants
    }
}

impl<'a> IntoIterator for &'a VariantSet {
    type Item = &'a String;
    type IntoIter = std::collections::btree_set::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.variants.iter()
    }
}

impl IntoIterator for VariantSet {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.variants.into_iter()
    }
}

/// Every way of collapsing leet tokens in `password` back to plain letters,
/// using the standard table and default limits.
///
/// The password itself is always part of the result.
pub fn normalize(password: &str) -> VariantSet {
    normalize_with(password, SubstitutionTable::standard(), NormalizeLimits::default())
}

/// [`normalize`] with an explicit table and limits.
///
/// At every position the walk first keeps the character unchanged, then tries
/// each matching token longest-first. Keeping first means the unmodified
/// input is the first variant collected, so it survives any truncation.
pub fn normalize_with(
    password: &str,
    table: &SubstitutionTable,
    limits: NormalizeLimits,
) -> VariantSet {
    let mut walk = Backtrack {
        table,
        limits,
        steps: 0,
        found: BTreeSet::new(),
        truncated: false,
        stopped: false,
    };
    let mut current = String::with_capacity(password.len());
    walk.descend(password, 0, &mut current);

    #[cfg(feature = "tracing")]
    if walk.truncated {
        tracing::debug!(
            "normalization truncated after {} steps, {} variants",
            walk.steps,
            walk.found.len()
        );
    }

    VariantSet {
        variants: walk.found,
        truncated: walk.truncated,
    }
}

struct Backtrack<'t> {
    table: &'t SubstitutionTable,
    limits: NormalizeLimits,
    steps: usize,
    found: BTreeSet<String>,
    /// A variant not yet collected was dropped.
    truncated: bool,
    /// No further variant can be collected.
    stopped: bool,
}

impl Backtrack<'_> {
    fn descend(&mut self, remaining: &str, depth: usize, current: &mut String) {
        if self.stopped {
            return;
        }
        if self.steps >= self.limits.max_steps {
            self.truncated = true;
            self.stopped = true;
            return;
        }
        self.steps += 1;

        let Some(first) = remaining.chars().next() else {
            self.collect(current);
            return;
        };

        let mark = current.len();

        if depth >= self.limits.max_depth {
            current.push_str(remaining);
            self.collect(current);
            current.truncate(mark);
            if self.table.has_substitutions(remaining) {
                self.truncated = true;
            }
            return;
        }

        current.push(first);
        self.descend(&remaining[first.len_utf8()..], depth + 1, current);
        current.truncate(mark);

        let table = self.table;
        for (token, letters) in table.matching_prefixes(remaining) {
            for &letter in letters {
                current.push(letter);
                self.descend(&remaining[token.len()..], depth + 1, current);
                current.truncate(mark);
            }
        }
    }

    /// Duplicates are free; a new variant past the cap ends the walk.
    fn collect(&mut self, variant: &str) {
        if self.found.contains(variant) {
            return;
        }
        if self.found.len() >= self.limits.max_variants {
            self.truncated = true;
            self.stopped = true;
            return;
        }
        self.found.insert(variant.to_string());
    }
}

/// Lazy plain → leet expansion of `password` with the standard table.
pub fn obfuscate(password: &str, max_variants: usize) -> Obfuscations {
    obfuscate_with(password, SubstitutionTable::standard(), max_variants)
}

/// [`obfuscate`] with an explicit table.
pub fn obfuscate_with(
    password: &str,
    table: &SubstitutionTable,
    max_variants: usize,
) -> Obfuscations {
    let options = password
        .chars()
        .map(|c| {
            let mut choices = Vec::with_capacity(table.forms(c).len() + 1);
            choices.push(c.to_string());
            choices.extend(table.forms(c).iter().cloned());
            choices
        })
        .collect::<Vec<_>>();

    Obfuscations {
        odometer: vec![0; options.len()],
        options,
        emitted: 0,
        max_variants,
        wrapped: false,
    }
}

/// Cartesian product of per-character choices, produced one string at a time.
///
/// Each position offers the original character first, then its leet forms.
/// The last position varies fastest, so the first item is always the
/// unmodified password. Nothing beyond the current item is materialized.
#[derive(Debug, Clone)]
pub struct Obfuscations {
    options: Vec<Vec<String>>,
    odometer: Vec<usize>,
    emitted: usize,
    max_variants: usize,
    wrapped: bool,
}

impl Obfuscations {
    /// Rewinds to the first variant.
    pub fn restart(&mut self) {
        self.odometer.iter_mut().for_each(|slot| *slot = 0);
        self.emitted = 0;
        self.wrapped = false;
    }

    /// Whether the cap stopped the sequence before the product was exhausted.
    pub fn truncated(&self) -> bool {
        !self.wrapped && self.emitted >= self.max_variants
    }

    /// Size of the full product, saturating at `usize::MAX`.
    pub fn total_combinations(&self) -> usize {
        self.options
            .iter()
            .fold(1usize, |acc, choices| acc.saturating_mul(choices.len()))
    }

    fn advance(&mut self) -> bool {
        for pos in (0..self.odometer.len()).rev() {
            self.odometer[pos] += 1;
            if self.odometer[pos] < self.options[pos].len() {
                return true;
            }
            self.odometer[pos] = 0;
        }
        false
    }
}

impl Iterator for Obfuscations {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        if self.wrapped || self.emitted >= self.max_variants {
            return None;
        }

        let variant = self
            .odometer
            .iter()
            .zip(&self.options)
            .map(|(&choice, choices)| choices[choice].as_str())
            .collect::<String>();

        self.emitted += 1;
        self.wrapped = !self.advance();
        Some(variant)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.wrapped {
            return (0, Some(0));
        }
        (0, Some(self.max_variants.saturating_sub(self.emitted)))
    }
}
