//! Input sanitization for free-text fields.
//!
//! Titles and descriptions flow into metadata lookups and searches. Before
//! any of them reach storage, [`is_safe`] screens them against a denylist of
//! quoting characters, comment markers and SQL keywords. The metadata
//! repository binds every value as a parameter regardless; this check is an
//! additional gate at the service boundary.

use std::path::Path;

use crate::{DocstoreError, Result};

/// Characters that are never accepted in free-text fields.
const FORBIDDEN_CHARS: &[char] = &['\'', '"', ';'];

/// SQL comment marker.
const COMMENT_MARKER: &str = "--";

/// Keywords rejected when they appear as a whole word, in any case.
const DENYLISTED_KEYWORDS: &[&str] = &[
    "SELECT", "INSERT", "UPDATE", "DELETE", "DROP", "TRUNCATE", "EXEC", "EXECUTE", "DECLARE",
    "UNION", "FETCH", "ALTER", "CREATE", "RENAME", "DESCRIBE",
];

/// Check whether a free-text value is safe to pass to storage operations.
///
/// Absent and empty values are always safe.
///
/// # Examples
///
/// ```
/// use docstore::validation::is_safe;
///
/// assert!(is_safe(Some("Quarterly report")));
/// assert!(is_safe(None));
/// assert!(!is_safe(Some("x'; DROP TABLE t; --")));
/// assert!(!is_safe(Some("please select this")));
/// ```
pub fn is_safe(input: Option<&str>) -> bool {
    let Some(text) = input else {
        return true;
    };
    if text.is_empty() {
        return true;
    }

    if text.contains(FORBIDDEN_CHARS) || text.contains(COMMENT_MARKER) {
        return false;
    }

    !words(text).any(is_denylisted)
}

/// Reject an unsafe free-text value with a validation error naming the field.
pub fn ensure_safe(field: &str, input: Option<&str>) -> Result<()> {
    if is_safe(input) {
        Ok(())
    } else {
        Err(DocstoreError::Validation(format!(
            "{field} contains forbidden characters or keywords"
        )))
    }
}

/// Derive the on-disk name for an uploaded file.
///
/// Only the final path component of the client-supplied name is kept, so a
/// name like `../../etc/passwd` is stored as `passwd`.
pub fn stored_name_for(original_name: &str) -> Result<String> {
    let name = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    if name.is_empty() || name == "." || name == ".." {
        return Err(DocstoreError::Validation(format!(
            "invalid filename: {original_name:?}"
        )));
    }
    if name.chars().any(char::is_control) {
        return Err(DocstoreError::Validation(
            "filename contains control characters".to_string(),
        ));
    }
    if Path::new(name).file_name().is_none() {
        return Err(DocstoreError::Validation(format!(
            "invalid filename: {original_name:?}"
        )));
    }

    Ok(name.to_string())
}

/// Split text into maximal runs of word characters.
fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !is_word_char(c))
        .filter(|word| !word.is_empty())
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_denylisted(word: &str) -> bool {
    DENYLISTED_KEYWORDS
        .iter()
        .any(|keyword| keyword.eq_ignore_ascii_case(word))
}
