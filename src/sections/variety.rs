//! Character variety section - checks for uppercase, lowercase, numbers, special chars.

use secrecy::{ExposeSecret, SecretString};

use super::{SectionContext, SectionResult};

/// Character classes, in the order they are reported.
const CLASSES: [(&str, fn(char) -> bool); 4] = [
    ("uppercase", char::is_uppercase),
    ("lowercase", char::is_lowercase),
    ("numbers", char::is_numeric),
    ("special characters", is_special),
];

fn is_special(c: char) -> bool {
    !c.is_alphanumeric()
}

/// Number of character classes present in `pwd`, out of four.
pub(crate) fn class_count(pwd: &str) -> usize {
    CLASSES
        .iter()
        .filter(|(_, test)| pwd.chars().any(*test))
        .count()
}

/// Checks if the password contains a variety of character types.
///
/// # Returns
/// - `Ok(Some(reason))` listing the missing character types
/// - `Ok(None)` if all character types are present
pub fn character_variety_section(password: &SecretString, _ctx: &SectionContext<'_>) -> SectionResult {
    let pwd = password.expose_secret();
    let missing: Vec<&str> = CLASSES
        .iter()
        .filter(|(_, test)| !pwd.chars().any(*test))
        .map(|(name, _)| *name)
        .collect();

    if missing.is_empty() {
        return Ok(None);
    }
    Ok(Some(format!("Missing: {}", missing.join(", "))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::BannedTermCorpus;

    fn check(pwd: &str) -> SectionResult {
        let corpus = BannedTermCorpus::empty();
        character_variety_section(&SecretString::new(pwd.to_string().into()), &SectionContext { corpus: &corpus })
    }

    #[test]
    fn test_variety_section_missing_uppercase() {
        assert_eq!(check("lowercase123!"), Ok(Some("Missing: uppercase".to_string())));
    }

    #[test]
    fn test_variety_section_missing_several() {
        assert_eq!(
            check("UPPERCASE"),
            Ok(Some("Missing: lowercase, numbers, special characters".to_string()))
        );
    }

    #[test]
    fn test_variety_section_all_categories() {
        assert_eq!(check("HasAll123!@#"), Ok(None));
    }

    #[test]
    fn test_class_count() {
        assert_eq!(class_count(""), 0);
        assert_eq!(class_count("abc"), 1);
        assert_eq!(class_count("Summ3r2024!"), 4);
    }
}
