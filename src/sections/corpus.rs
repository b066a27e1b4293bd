//! Corpus section - checks the password against common and banned passwords.

use secrecy::{ExposeSecret, SecretString};

use super::{SectionContext, SectionResult};
use crate::estimator::Estimator;

/// Checks if the password is a common password or a banned term.
///
/// # Returns
/// - `Ok(Some(reason))` if the whole password is listed
/// - `Ok(None)` otherwise
pub fn corpus_section(password: &SecretString, ctx: &SectionContext<'_>) -> SectionResult {
    let pwd = password.expose_secret();
    if Estimator::standard().common_rank(pwd).is_some() {
        return Ok(Some("Password is one of the most common passwords".to_string()));
    }
    if ctx.corpus.contains(pwd.trim()) {
        return Ok(Some("Password is a banned term".to_string()));
    }
    Ok(None)
}
