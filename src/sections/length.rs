//! Length section - checks password minimum length.

use secrecy::{ExposeSecret, SecretString};

use super::{SectionContext, SectionResult};

const MIN_LENGTH: usize = 8;

/// Checks that the password has at least [`MIN_LENGTH`] characters once
/// surrounding whitespace is ignored.
///
/// # Returns
/// - `Ok(Some(reason))` if password is too short
/// - `Ok(None)` if password has sufficient length
pub fn length_section(password: &SecretString, _ctx: &SectionContext<'_>) -> SectionResult {
    let pwd = password.expose_secret();
    let effective = pwd.trim().chars().count();
    if effective >= MIN_LENGTH {
        return Ok(None);
    }
    if effective < pwd.chars().count() {
        return Ok(Some(format!(
            "Password must be at least {MIN_LENGTH} characters, not counting leading or trailing spaces"
        )));
    }
    Ok(Some(format!("Password must be at least {MIN_LENGTH} characters")))
}
