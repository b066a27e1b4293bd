//! Human-readable feedback for an estimate.

use serde::{Deserialize, Serialize};

use super::matching::{MatchKind, PatternMatch};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub warning: String,
    pub suggestions: Vec<String>,
}

const DEFAULT_SUGGESTIONS: [&str; 2] = [
    "Use a few words, avoid common phrases",
    "No need for symbols, digits, or uppercase letters",
];

/// Dictionary name under which caller-supplied terms are ranked.
pub const USER_INPUTS: &str = "user_inputs";

/// Dictionary name of the administrative banned-term corpus.
pub const BANNED_WORDS: &str = "banned_words";

pub fn build(score: u8, sequence: &[PatternMatch]) -> Feedback {
    if sequence.is_empty() {
        return Feedback {
            warning: String::new(),
            suggestions: DEFAULT_SUGGESTIONS.iter().map(|s| s.to_string()).collect(),
        };
    }
    if score > 2 {
        return Feedback::default();
    }

    let Some(longest) = sequence.iter().max_by_key(|m| m.len()) else {
        return Feedback::default();
    };

    let mut feedback = match_feedback(longest, sequence.len() == 1);
    feedback
        .suggestions
        .insert(0, "Add another word or two. Uncommon words are better.".to_string());
    feedback
}

fn match_feedback(m: &PatternMatch, sole_match: bool) -> Feedback {
    match &m.kind {
        MatchKind::Dictionary {
            dictionary_name,
            rank,
            reversed,
            ..
        } => dictionary_feedback(&m.token, dictionary_name, *rank, *reversed, sole_match),
        MatchKind::Repeat { .. } => Feedback {
            warning: "Repeats like \"aaa\" are easy to guess".into(),
            suggestions: vec!["Avoid repeated words and characters".into()],
        },
        MatchKind::Sequence { .. } => Feedback {
            warning: "Sequences like abc or 6543 are easy to guess".into(),
            suggestions: vec!["Avoid sequences".into()],
        },
        MatchKind::Year => Feedback {
            warning: "Recent years are easy to guess".into(),
            suggestions: vec![
                "Avoid recent years".into(),
                "Avoid years that are associated with you".into(),
            ],
        },
        MatchKind::Bruteforce => Feedback::default(),
    }
}

fn dictionary_feedback(
    token: &str,
    dictionary_name: &str,
    rank: usize,
    reversed: bool,
    sole_match: bool,
) -> Feedback {
    let warning = if dictionary_name == USER_INPUTS || dictionary_name == BANNED_WORDS {
        "This contains a banned term".to_string()
    } else if sole_match && !reversed {
        match rank {
            0..=10 => "This is a top-10 common password".to_string(),
            11..=100 => "This is a top-100 common password".to_string(),
            _ => "This is a very common password".to_string(),
        }
    } else {
        "This is similar to a commonly used password".to_string()
    };

    let mut suggestions = Vec::new();
    let mut chars = token.chars();
    let first_upper = chars.next().is_some_and(char::is_uppercase);
    let all_upper = token.chars().any(char::is_uppercase) && !token.chars().any(char::is_lowercase);
    if all_upper {
        suggestions.push("All-uppercase is almost as easy to guess as all-lowercase".to_string());
    } else if first_upper {
        suggestions.push("Capitalization doesn't help very much".to_string());
    }
    if reversed && token.chars().count() >= 4 {
        suggestions.push("Reversed words aren't much harder to guess".to_string());
    }

    Feedback {
        warning,
        suggestions,
    }
}
