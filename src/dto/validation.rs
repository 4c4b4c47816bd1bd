//! Validation helpers for identifiers typed by people.

use validator::ValidationError;

use crate::state::game::is_valid_pin;

/// Canonical form of a pin typed by a player: trimmed and uppercased.
///
/// ```ignore
/// normalize_pin(" ab12 ") // Ok("AB12")
/// normalize_pin("AB1")    // Err - too short
/// ```
pub fn normalize_pin(raw: &str) -> Result<String, ValidationError> {
    let pin = raw.trim().to_ascii_uppercase();
    if !is_valid_pin(&pin) {
        let mut err = ValidationError::new("pin_format");
        err.message = Some("Pin must be 4 letters or digits".into());
        return Err(err);
    }
    Ok(pin)
}

/// Trim a player name and check it is usable.
pub fn normalize_player_name(raw: &str, max_len: usize) -> Result<String, ValidationError> {
    let name = raw.trim();
    if name.is_empty() {
        let mut err = ValidationError::new("player_name_empty");
        err.message = Some("Name must not be empty".into());
        return Err(err);
    }

    let length = name.chars().count();
    if length > max_len {
        let mut err = ValidationError::new("player_name_length");
        err.message =
            Some(format!("Name must be at most {max_len} characters (got {length})").into());
        return Err(err);
    }

    if name.chars().any(char::is_control) {
        let mut err = ValidationError::new("player_name_format");
        err.message = Some("Name must not contain control characters".into());
        return Err(err);
    }

    Ok(name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_pin_valid() {
        assert_eq!(normalize_pin("AB12").unwrap(), "AB12");
        assert_eq!(normalize_pin(" ab12\n").unwrap(), "AB12");
        assert_eq!(normalize_pin("zzzz").unwrap(), "ZZZZ");
    }

    #[test]
    fn test_normalize_pin_invalid() {
        assert!(normalize_pin("").is_err());
        assert!(normalize_pin("AB1").is_err()); // too short
        assert!(normalize_pin("AB123").is_err()); // too long
        assert!(normalize_pin("AB-1").is_err()); // punctuation
        assert!(normalize_pin("ÄB12").is_err());
    }

    #[test]
    fn test_normalize_player_name() {
        assert_eq!(normalize_player_name("  Alice ", 32).unwrap(), "Alice");
        assert!(normalize_player_name("   ", 32).is_err());
        assert!(normalize_player_name("abcdef", 5).is_err());
        assert_eq!(normalize_player_name("Zoë", 3).unwrap(), "Zoë");
        assert!(normalize_player_name("a\u{7}b", 32).is_err());
    }
}
