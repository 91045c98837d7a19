//! Post and comment text rules shared by every write path.

use super::error::DomainError;

/// Number of characters used when a post is referenced by a short label.
pub const POST_LABEL_CHARS: usize = 15;

/// Trim and validate the body of a post. Blank text is rejected.
pub fn normalize_post_text(text: &str) -> Result<String, DomainError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("text", "post text must not be empty"));
    }
    Ok(trimmed.to_string())
}

/// Trim the body of a comment, returning `None` when nothing is left.
pub fn normalize_comment_text(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Short label for a post, counted in characters rather than bytes.
pub fn post_label(text: &str) -> String {
    text.chars().take(POST_LABEL_CHARS).collect()
}

/// Normalise an optional image reference; empty strings mean "no image".
pub fn normalize_image(image: Option<&str>) -> Option<String> {
    image
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
