//! Composition features and the constraints checked against them.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::estimator::Estimate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    Length,
    /// `log10` of the estimated guess count.
    Entropy,
    ShannonEntropy,
    NumUniqueChars,
    UniqueCharRatio,
    HasUpperLower,
    DigitRatio,
    SpecialRatio,
    UpperCaseRatio,
    LowerCaseRatio,
    /// Distinct characters occurring more than once.
    NumRepeatedChars,
    DictionaryMatchCount,
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Feature::Length => "length",
            Feature::Entropy => "entropy",
            Feature::ShannonEntropy => "shannon_entropy",
            Feature::NumUniqueChars => "num_unique_chars",
            Feature::UniqueCharRatio => "unique_char_ratio",
            Feature::HasUpperLower => "has_upper_lower",
            Feature::DigitRatio => "digit_ratio",
            Feature::SpecialRatio => "special_ratio",
            Feature::UpperCaseRatio => "upper_case_ratio",
            Feature::LowerCaseRatio => "lower_case_ratio",
            Feature::NumRepeatedChars => "num_repeated_chars",
            Feature::DictionaryMatchCount => "dictionary_match_count",
        };
        f.write_str(name)
    }
}

/// Measured composition of one password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionFeatures {
    pub length: usize,
    pub entropy: f64,
    pub shannon_entropy: f64,
    pub num_unique_chars: usize,
    pub unique_char_ratio: f64,
    pub has_upper_lower: bool,
    pub digit_ratio: f64,
    pub special_ratio: f64,
    pub upper_case_ratio: f64,
    pub lower_case_ratio: f64,
    pub num_repeated_chars: usize,
    pub dictionary_match_count: usize,
}

impl CompositionFeatures {
    /// Measures `password`; `estimate` supplies entropy and dictionary matches.
    pub fn measure(password: &str, estimate: &Estimate) -> Self {
        let mut counts: HashMap<char, usize> = HashMap::new();
        let (mut upper, mut lower, mut digits, mut special) = (0usize, 0usize, 0usize, 0usize);
        for c in password.chars() {
            *counts.entry(c).or_default() += 1;
            if c.is_uppercase() {
                upper += 1;
            } else if c.is_lowercase() {
                lower += 1;
            }
            if c.is_numeric() {
                digits += 1;
            }
            if !c.is_alphanumeric() {
                special += 1;
            }
        }

        let length = password.chars().count();
        let ratio = |n: usize| if length == 0 { 0.0 } else { n as f64 / length as f64 };
        let shannon_entropy = counts
            .values()
            .map(|&n| {
                let p = ratio(n);
                -p * p.log2()
            })
            .sum::<f64>();

        Self {
            length,
            entropy: estimate.guesses_log10,
            shannon_entropy,
            num_unique_chars: counts.len(),
            unique_char_ratio: ratio(counts.len()),
            has_upper_lower: upper > 0 && lower > 0,
            digit_ratio: ratio(digits),
            special_ratio: ratio(special),
            upper_case_ratio: ratio(upper),
            lower_case_ratio: ratio(lower),
            num_repeated_chars: counts.values().filter(|&&n| n > 1).count(),
            dictionary_match_count: estimate.dictionary_matches().count(),
        }
    }

    /// Numeric value of `feature`; booleans are 0 or 1.
    pub fn get(&self, feature: Feature) -> f64 {
        match feature {
            Feature::Length => self.length as f64,
            Feature::Entropy => self.entropy,
            Feature::ShannonEntropy => self.shannon_entropy,
            Feature::NumUniqueChars => self.num_unique_chars as f64,
            Feature::UniqueCharRatio => self.unique_char_ratio,
            Feature::HasUpperLower => f64::from(u8::from(self.has_upper_lower)),
            Feature::DigitRatio => self.digit_ratio,
            Feature::SpecialRatio => self.special_ratio,
            Feature::UpperCaseRatio => self.upper_case_ratio,
            Feature::LowerCaseRatio => self.lower_case_ratio,
            Feature::NumRepeatedChars => self.num_repeated_chars as f64,
            Feature::DictionaryMatchCount => self.dictionary_match_count as f64,
        }
    }
}

/// Bound on one feature. Serialized as `{"min": 12}`, `{"max": 2}` or
/// `{"required": true}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    Min(f64),
    Max(f64),
    Required(bool),
}

impl Constraint {
    pub fn is_satisfied_by(&self, actual: f64) -> bool {
        match *self {
            Constraint::Min(min) => actual >= min,
            Constraint::Max(max) => actual <= max,
            Constraint::Required(required) => !required || actual != 0.0,
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constraint::Min(min) => write!(f, "min {min}"),
            Constraint::Max(max) => write!(f, "max {max}"),
            Constraint::Required(required) => write!(f, "required {required}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedCondition {
    pub feature: Feature,
    /// Human-readable bound, e.g. `min 12`.
    pub expected: String,
    pub actual: f64,
}

/// Feature constraints, one per feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositionPolicy {
    constraints: BTreeMap<Feature, Constraint>,
}

impl Default for CompositionPolicy {
    fn default() -> Self {
        use Constraint::{Max, Min, Required};
        Self::from_constraints([
            (Feature::Length, Min(12.0)),
            (Feature::Entropy, Min(15.0)),
            (Feature::ShannonEntropy, Min(2.5)),
            (Feature::NumUniqueChars, Min(5.0)),
            (Feature::UniqueCharRatio, Min(0.5)),
            (Feature::HasUpperLower, Required(true)),
            (Feature::DigitRatio, Min(0.1)),
            (Feature::SpecialRatio, Min(0.1)),
            (Feature::UpperCaseRatio, Min(0.1)),
            (Feature::LowerCaseRatio, Min(0.1)),
            (Feature::NumRepeatedChars, Max(2.0)),
            (Feature::DictionaryMatchCount, Max(1.0)),
        ])
    }
}

impl CompositionPolicy {
    /// Policy without constraints; every password passes.
    pub fn unconstrained() -> Self {
        Self {
            constraints: BTreeMap::new(),
        }
    }

    pub fn from_constraints<I>(constraints: I) -> Self
    where
        I: IntoIterator<Item = (Feature, Constraint)>,
    {
        Self {
            constraints: constraints.into_iter().collect(),
        }
    }

    /// Replaces the constraint on `feature`.
    pub fn with(mut self, feature: Feature, constraint: Constraint) -> Self {
        self.constraints.insert(feature, constraint);
        self
    }

    pub fn get(&self, feature: Feature) -> Option<Constraint> {
        self.constraints.get(&feature).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Feature, Constraint)> + '_ {
        self.constraints.iter().map(|(f, c)| (*f, *c))
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Constraints violated by `features`, in feature order.
    pub fn check(&self, features: &CompositionFeatures) -> Vec<FailedCondition> {
        self.iter()
            .filter_map(|(feature, constraint)| {
                let actual = features.get(feature);
                (!constraint.is_satisfied_by(actual)).then(|| FailedCondition {
                    feature,
                    expected: constraint.to_string(),
                    actual,
                })
            })
            .collect()
    }
}
