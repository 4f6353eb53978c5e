//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest player name or category key accepted by the leaderboard.
pub const MAX_LABEL_LENGTH: usize = 64;

/// Validates a player name or category key: bounded length and no control characters.
///
/// Blank values are accepted here; callers decide what blank means (no-op name, global
/// category).
///
/// # Examples
///
/// ```ignore
/// validate_label("Alice")   // Ok
/// validate_label("19")      // Ok
/// validate_label("a\u{7}b") // Err - control character
/// ```
pub fn validate_label(value: &str) -> Result<(), ValidationError> {
    let length = value.chars().count();
    if length > MAX_LABEL_LENGTH {
        let mut err = ValidationError::new("label_length");
        err.message = Some(
            format!("must be at most {MAX_LABEL_LENGTH} characters (got {length})").into(),
        );
        return Err(err);
    }

    if value.chars().any(char::is_control) {
        let mut err = ValidationError::new("label_format");
        err.message = Some("must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_label_valid() {
        assert!(validate_label("Alice").is_ok());
        assert!(validate_label("19").is_ok());
        assert!(validate_label("").is_ok());
        assert!(validate_label(&"x".repeat(MAX_LABEL_LENGTH)).is_ok());
    }

    #[test]
    fn test_validate_label_too_long() {
        assert!(validate_label(&"x".repeat(MAX_LABEL_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_label_control_characters() {
        assert!(validate_label("a\nb").is_err());
        assert!(validate_label("tab\there").is_err());
    }
}
