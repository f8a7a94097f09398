//! Input validation for security-critical data
//!
//! This module provides validation functions for data that crosses a trust
//! boundary: ids echoed back by daemons, subjects resolved from tokens, and
//! paths the daemon turns into local URLs.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Regex for validating call IDs (lowercase hyphenated UUID)
static CALL_ID_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-f0-9]{8}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{4}-[a-f0-9]{12}$").unwrap()
});

/// Maximum length for subject identifiers
pub const MAX_SUBJECT_LENGTH: usize = 256;

/// Maximum length for HTTP paths
pub const MAX_PATH_LENGTH: usize = 2048;

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid call ID format: {0}")]
    InvalidCallId(String),

    #[error("Invalid subject: {0}")]
    InvalidSubject(String),

    #[error("Path too long: {0} bytes (max: {1})")]
    PathTooLong(usize, usize),

    #[error("Path must be origin-relative: {0}")]
    InvalidPath(String),
}

/// Validate call ID format
///
/// # Examples
///
/// ```
/// use http_relay_common::validation::validate_call_id;
///
/// assert!(validate_call_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
/// assert!(validate_call_id("invalid").is_err());
/// ```
pub fn validate_call_id(id: &str) -> Result<(), ValidationError> {
    if !CALL_ID_REGEX.is_match(id) {
        return Err(ValidationError::InvalidCallId(
            id.chars().take(50).collect::<String>(), // Limit error message
        ));
    }
    Ok(())
}

/// Validate a subject resolved from a verified token
///
/// Subjects key the session registry, so they must be non-empty, bounded and
/// free of control characters.
pub fn validate_subject(subject: &str) -> Result<(), ValidationError> {
    if subject.trim().is_empty()
        || subject.len() > MAX_SUBJECT_LENGTH
        || subject.chars().any(char::is_control)
    {
        return Err(ValidationError::InvalidSubject(
            subject.chars().take(50).filter(|c| !c.is_control()).collect(),
        ));
    }
    Ok(())
}

/// Validate and sanitize HTTP path
///
/// - Removes control characters
/// - Enforces length limits
/// - Ensures path starts with a single /
pub fn validate_path(path: &str) -> Result<String, ValidationError> {
    if path.len() > MAX_PATH_LENGTH {
        return Err(ValidationError::PathTooLong(path.len(), MAX_PATH_LENGTH));
    }

    let sanitized: String = path.chars().filter(|c| !c.is_control()).collect();

    if sanitized.is_empty() {
        return Ok("/".to_string());
    }

    // "//host/x" or "http://host" would let a caller steer the daemon off its local service
    if sanitized.starts_with("//") || sanitized.contains("://") {
        return Err(ValidationError::InvalidPath(
            sanitized.chars().take(50).collect(),
        ));
    }

    if sanitized.starts_with('/') {
        Ok(sanitized)
    } else {
        Ok(format!("/{}", sanitized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_call_id_valid() {
        assert!(validate_call_id("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_call_id("00000000-0000-0000-0000-000000000000").is_ok());
        assert!(validate_call_id(&crate::generate_call_id()).is_ok());
    }

    #[test]
    fn test_validate_call_id_invalid() {
        assert!(validate_call_id("invalid").is_err());
        assert!(validate_call_id("550E8400-E29B-41D4-A716-446655440000").is_err()); // uppercase
        assert!(validate_call_id("req_550e8400-e29b-41d4-a716-446655440000").is_err());
        assert!(validate_call_id("").is_err());
    }

    #[test]
    fn test_validate_subject() {
        assert!(validate_subject("user_2abc").is_ok());
        assert!(validate_subject("42").is_ok());
        assert!(validate_subject("").is_err());
        assert!(validate_subject("   ").is_err());
        assert!(validate_subject("user\n42").is_err());
        assert!(validate_subject(&"a".repeat(MAX_SUBJECT_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_path() {
        assert_eq!(validate_path("/foo/bar").unwrap(), "/foo/bar");
        assert_eq!(validate_path("/foo?x=1&y=2").unwrap(), "/foo?x=1&y=2");
        assert_eq!(validate_path("foo/bar").unwrap(), "/foo/bar");
        assert_eq!(validate_path("").unwrap(), "/");

        // Control characters removed
        let sanitized = validate_path("/foo\x00/bar\n/baz").unwrap();
        assert_eq!(sanitized, "/foo/bar/baz");

        // Too long
        let long_path = "/".to_string() + &"a".repeat(3000);
        assert!(validate_path(&long_path).is_err());
    }

    #[test]
    fn test_validate_path_rejects_absolute_targets() {
        assert!(validate_path("//evil.example.com/x").is_err());
        assert!(validate_path("http://evil.example.com/").is_err());
        assert!(validate_path("/redirect?to=https://ok.example.com").is_err());
    }
}
