//! Session ID sanitization
//!
//! Session IDs name a directory under the state home, so they are reduced to
//! a conservative filesystem-safe alphabet before use.

use crate::error::SessionIdError;
use unicode_normalization::UnicodeNormalization;

/// Session used when the caller does not pass `--session`.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Sanitize a session ID for filesystem use.
///
/// - Normalizes Unicode with NFKC so full-width confusables collapse
/// - Keeps only `[A-Za-z0-9._-]`, replacing everything else with `_`
/// - Breaks up `..` so an ID can never traverse upward
/// - Rejects IDs that are empty or carry no meaningful character
///
/// ```
/// use ace_utils::session_id::sanitize_session_id;
///
/// assert_eq!(sanitize_session_id("checkout-v2").unwrap(), "checkout-v2");
/// assert_eq!(sanitize_session_id("my session!").unwrap(), "my_session_");
/// assert_eq!(sanitize_session_id("ｄｅｍｏ").unwrap(), "demo");
/// ```
pub fn sanitize_session_id(id: &str) -> Result<String, SessionIdError> {
    let normalized: String = id.trim().nfkc().collect();

    let mut sanitized: String = normalized
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    while sanitized.contains("..") {
        sanitized = sanitized.replace("..", "__");
    }

    if sanitized.is_empty() {
        return Err(SessionIdError::Empty);
    }

    if sanitized.chars().all(|c| c == '_' || c == '.') {
        return Err(SessionIdError::OnlyInvalidCharacters);
    }

    if sanitized != id {
        tracing::debug!(original = %id, sanitized = %sanitized, "Session ID sanitized");
    }

    Ok(sanitized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids_pass_through() {
        for id in ["default", "checkout-v2", "a.b_c-1"] {
            assert_eq!(sanitize_session_id(id).unwrap(), id);
        }
    }

    #[test]
    fn test_traversal_is_neutralized() {
        let id = sanitize_session_id("../../etc").unwrap();
        assert!(!id.contains(".."));
        assert!(!id.contains('/'));
    }

    #[test]
    fn test_rejects_meaningless_ids() {
        assert_eq!(sanitize_session_id("").unwrap_err(), SessionIdError::Empty);
        assert_eq!(sanitize_session_id("   ").unwrap_err(), SessionIdError::Empty);
        assert_eq!(
            sanitize_session_id("!!!").unwrap_err(),
            SessionIdError::OnlyInvalidCharacters
        );
    }

    proptest::proptest! {
        #[test]
        fn prop_sanitized_ids_are_single_path_components(raw in "\\PC{0,40}") {
            if let Ok(id) = sanitize_session_id(&raw) {
                proptest::prop_assert!(!id.contains(".."));
                proptest::prop_assert!(!id.contains('/') && !id.contains('\\'));
                proptest::prop_assert!(id.chars().all(|c| c.is_ascii()));
            }
        }
    }
}
