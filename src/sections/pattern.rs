//! Pattern analysis section - detects runs, sequences and keyboard walks.

use secrecy::{ExposeSecret, SecretString};

use super::{SectionContext, SectionResult};

const MAX_RUN: usize = 2;
const MIN_SEQUENCE: usize = 4;
const KEYBOARD_ROWS: [&str; 4] = ["1234567890", "qwertyuiop", "asdfghjkl", "zxcvbnm"];

/// Analyzes password for repeated characters, alphabetical or numeric
/// sequences and walks along a keyboard row.
///
/// # Returns
/// - `Ok(Some(reason))` for the first problematic pattern found
/// - `Ok(None)` if no problematic patterns
pub fn pattern_analysis_section(password: &SecretString, _ctx: &SectionContext<'_>) -> SectionResult {
    let chars: Vec<char> = password.expose_secret().chars().collect();

    if longest_run(&chars) > MAX_RUN {
        return Ok(Some("Password contains repetitive patterns".to_string()));
    }
    if has_sequence(&chars) {
        return Ok(Some("Password contains sequential patterns".to_string()));
    }
    if has_keyboard_walk(&chars) {
        return Ok(Some("Password contains keyboard patterns".to_string()));
    }
    Ok(None)
}

fn longest_run(chars: &[char]) -> usize {
    chars
        .chunk_by(|a, b| a == b)
        .map(<[char]>::len)
        .max()
        .unwrap_or(0)
}

/// Consecutive code points, ascending or descending, `MIN_SEQUENCE` long.
fn has_sequence(chars: &[char]) -> bool {
    chars.windows(MIN_SEQUENCE).any(|window| {
        let steps: Vec<i64> = window
            .windows(2)
            .map(|pair| i64::from(u32::from(pair[1])) - i64::from(u32::from(pair[0])))
            .collect();
        steps.iter().all(|&s| s == 1) || steps.iter().all(|&s| s == -1)
    })
}

fn has_keyboard_walk(chars: &[char]) -> bool {
    let lowered: String = chars.iter().flat_map(|c| c.to_lowercase()).collect();
    let lowered: Vec<char> = lowered.chars().collect();
    lowered.windows(MIN_SEQUENCE).any(|window| {
        let needle: String = window.iter().collect();
        let reversed: String = window.iter().rev().collect();
        KEYBOARD_ROWS
            .iter()
            .any(|row| row.contains(&needle) || row.contains(&reversed))
    })
}
