//! Validation helpers for DTOs.

use validator::ValidationError;

/// Longest team name accepted.
pub const TEAM_NAME_MAX_LEN: usize = 32;
/// Longest device identifier accepted.
pub const DEVICE_ID_MAX_LEN: usize = 64;

/// Validates that a device ID is 1 to 64 ASCII letters, digits, `-` or `_`.
///
/// Device IDs end up in storage document keys, so nothing else is accepted.
///
/// ```ignore
/// validate_device_id("phone-42")   // Ok
/// validate_device_id("phone 42")   // Err - space
/// validate_device_id("")           // Err - empty
/// ```
pub fn validate_device_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() || id.len() > DEVICE_ID_MAX_LEN {
        let mut err = ValidationError::new("device_id_length");
        err.message = Some(
            format!(
                "Device ID must be between 1 and {DEVICE_ID_MAX_LEN} characters (got {})",
                id.len()
            )
            .into(),
        );
        return Err(err);
    }

    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        let mut err = ValidationError::new("device_id_format");
        err.message = Some("Device ID may only contain letters, digits, `-` and `_`".into());
        return Err(err);
    }

    Ok(())
}

/// Validates a team name: 1 to 32 characters once trimmed, no control characters.
pub fn validate_team_name(name: &str) -> Result<(), ValidationError> {
    let trimmed = name.trim();
    let len = trimmed.chars().count();
    if len == 0 || len > TEAM_NAME_MAX_LEN {
        let mut err = ValidationError::new("team_name_length");
        err.message = Some(
            format!("Team name must be between 1 and {TEAM_NAME_MAX_LEN} characters (got {len})")
                .into(),
        );
        return Err(err);
    }

    if trimmed.chars().any(char::is_control) {
        let mut err = ValidationError::new("team_name_format");
        err.message = Some("Team name must not contain control characters".into());
        return Err(err);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_device_id_valid() {
        assert!(validate_device_id("phone-42").is_ok());
        assert!(validate_device_id("A_b-3").is_ok());
        assert!(validate_device_id(&"x".repeat(DEVICE_ID_MAX_LEN)).is_ok());
    }

    #[test]
    fn test_validate_device_id_invalid() {
        assert!(validate_device_id("").is_err());
        assert!(validate_device_id(&"x".repeat(DEVICE_ID_MAX_LEN + 1)).is_err());
        assert!(validate_device_id("phone 42").is_err());
        assert!(validate_device_id("../admin").is_err());
    }

    #[test]
    fn test_validate_team_name() {
        assert!(validate_team_name("Les Comètes").is_ok());
        assert!(validate_team_name("   ").is_err());
        assert!(validate_team_name(&"é".repeat(TEAM_NAME_MAX_LEN)).is_ok());
        assert!(validate_team_name(&"é".repeat(TEAM_NAME_MAX_LEN + 1)).is_err());
        assert!(validate_team_name("tab\there").is_err());
    }
}
