//! Input rules shared by registration and request creation

use regex::Regex;
use std::sync::OnceLock;

use crate::error::CoreError;
use crate::models::ContactType;

pub const MAX_USERNAME_LEN: usize = 150;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_LOCATION_LEN: usize = 255;
pub const MAX_NOTE_LEN: usize = 5000;
pub const MAX_FOLDER_SETTING_LEN: usize = 255;

static PHONE_RE: OnceLock<Regex> = OnceLock::new();

fn phone_regex() -> &'static Regex {
    PHONE_RE.get_or_init(|| Regex::new(r"^\+?[1-9]\d{7,14}$").expect("phone pattern is valid"))
}

/// Phone numbers: optional `+`, then 8 to 15 digits not starting with 0
pub fn validate_phone(field: &str, phone: &str) -> Result<String, CoreError> {
    let phone = phone.trim();
    if !phone_regex().is_match(phone) {
        return Err(CoreError::Validation(format!(
            "{}: enter a valid phone number, e.g. +919876543210",
            field
        )));
    }
    Ok(phone.to_string())
}

pub fn validate_username(username: &str) -> Result<String, CoreError> {
    let username = username.trim();
    if username.is_empty() {
        return Err(CoreError::Validation("username is required".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(CoreError::Validation(format!(
            "username must be at most {} characters",
            MAX_USERNAME_LEN
        )));
    }
    if username.chars().any(char::is_whitespace) {
        return Err(CoreError::Validation("username must not contain spaces".to_string()));
    }
    Ok(username.to_string())
}

pub fn validate_password(password: &str) -> Result<(), CoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::Validation(format!(
            "password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    if password.chars().all(|c| c.is_ascii_digit()) {
        return Err(CoreError::Validation("password cannot be entirely numeric".to_string()));
    }
    Ok(())
}

pub fn parse_contact_type(field: &str, value: Option<&str>) -> Result<Option<ContactType>, CoreError> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|e: String| CoreError::Validation(format!("{}: {}", field, e))),
    }
}

pub fn validate_location(location: &str) -> Result<String, CoreError> {
    let location = location.trim();
    if location.is_empty() {
        return Err(CoreError::Validation("location is required".to_string()));
    }
    if location.chars().count() > MAX_LOCATION_LEN {
        return Err(CoreError::Validation(format!(
            "location must be at most {} characters",
            MAX_LOCATION_LEN
        )));
    }
    Ok(location.to_string())
}

pub fn validate_note(note: &str) -> Result<String, CoreError> {
    let note = note.trim();
    if note.chars().count() > MAX_NOTE_LEN {
        return Err(CoreError::Validation(format!(
            "note must be at most {} characters",
            MAX_NOTE_LEN
        )));
    }
    Ok(note.to_string())
}

pub fn validate_folder_setting(field: &str, value: &str) -> Result<String, CoreError> {
    let value = value.trim();
    if value.chars().count() > MAX_FOLDER_SETTING_LEN {
        return Err(CoreError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_FOLDER_SETTING_LEN
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_validation() {
        assert_eq!(validate_phone("phone", " +919876543210 ").unwrap(), "+919876543210");
        assert!(validate_phone("phone", "98765432").is_ok());
        assert!(validate_phone("phone", "+123456789012345").is_ok());

        for bad in ["", "+0987654321", "1234567", "+1234567890123456", "98765-43210", "phone"] {
            assert!(validate_phone("phone", bad).is_err(), "{bad} should be rejected");
        }
    }

    #[test]
    fn test_password_policy() {
        assert!(validate_password("correct horse").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn test_username_rules() {
        assert_eq!(validate_username("  asha ").unwrap(), "asha");
        assert!(validate_username("").is_err());
        assert!(validate_username("two words").is_err());
        assert!(validate_username(&"a".repeat(151)).is_err());
        assert!(validate_username(&"a".repeat(150)).is_ok());
    }

    #[test]
    fn test_contact_type_is_optional() {
        assert_eq!(parse_contact_type("primary_type", None).unwrap(), None);
        assert_eq!(parse_contact_type("primary_type", Some("  ")).unwrap(), None);
        assert_eq!(
            parse_contact_type("primary_type", Some("telegram")).unwrap(),
            Some(ContactType::Telegram)
        );
        assert!(parse_contact_type("primary_type", Some("sms")).is_err());
    }

    #[test]
    fn test_location_and_note() {
        assert!(validate_location("   ").is_err());
        assert_eq!(validate_location(" Main hall ").unwrap(), "Main hall");
        assert!(validate_note(&"x".repeat(MAX_NOTE_LEN + 1)).is_err());
        assert_eq!(validate_note("").unwrap(), "");
    }
}
