//! Account name rules.

use super::error::DomainError;

pub const USERNAME_MAX_CHARS: usize = 150;

/// Characters allowed besides letters and digits.
const USERNAME_PUNCTUATION: &[char] = &['_', '.', '@', '+', '-'];

/// Trim and validate a username.
///
/// Usernames appear verbatim in profile paths, so they are limited to letters,
/// digits and `_ . @ + -`.
pub fn normalize_username(raw: &str) -> Result<String, DomainError> {
    let username = raw.trim();
    if username.is_empty() {
        return Err(DomainError::validation("username", "username must not be empty"));
    }
    if username.chars().count() > USERNAME_MAX_CHARS {
        return Err(DomainError::validation(
            "username",
            format!("username must be at most {USERNAME_MAX_CHARS} characters"),
        ));
    }
    if let Some(bad) = username
        .chars()
        .find(|c| !c.is_alphanumeric() && !USERNAME_PUNCTUATION.contains(c))
    {
        return Err(DomainError::validation(
            "username",
            format!("username must not contain {bad:?}"),
        ));
    }
    Ok(username.to_string())
}
