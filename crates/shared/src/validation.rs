//! Common validation utilities.

use validator::ValidationError;

/// Maximum integration name length.
const MAX_NAME_LENGTH: usize = 100;

/// Validates that a URL is an absolute http(s) URL with a non-empty host.
pub fn validate_absolute_http_url(url: &str) -> Result<(), ValidationError> {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"));

    match rest {
        Some(remainder) if !remainder.is_empty() && !remainder.starts_with('/') => Ok(()),
        _ => {
            let mut err = ValidationError::new("absolute_http_url");
            err.message = Some("Base URL must be an absolute http(s) URL".into());
            Err(err)
        }
    }
}

/// Validates an integration name: 1-100 chars, lowercase alphanumeric
/// with hyphens and underscores.
pub fn validate_integration_name(name: &str) -> Result<(), ValidationError> {
    let valid_chars = name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_');

    if !name.is_empty() && name.len() <= MAX_NAME_LENGTH && valid_chars {
        Ok(())
    } else {
        let mut err = ValidationError::new("integration_name");
        err.message =
            Some("Name must be 1-100 lowercase alphanumeric, hyphen or underscore characters".into());
        Err(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_http_urls() {
        assert!(validate_absolute_http_url("https://api.stripe.com").is_ok());
        assert!(validate_absolute_http_url("http://localhost:8080/v1").is_ok());
    }

    #[test]
    fn test_invalid_urls() {
        assert!(validate_absolute_http_url("ftp://example.com").is_err());
        assert!(validate_absolute_http_url("/relative/path").is_err());
        assert!(validate_absolute_http_url("https://").is_err());
        assert!(validate_absolute_http_url("example.com").is_err());
        assert!(validate_absolute_http_url("").is_err());
    }

    #[test]
    fn test_valid_names() {
        assert!(validate_integration_name("stripe").is_ok());
        assert!(validate_integration_name("sendgrid-email").is_ok());
        assert!(validate_integration_name("sms_provider_2").is_ok());
    }

    #[test]
    fn test_invalid_names() {
        assert!(validate_integration_name("").is_err());
        assert!(validate_integration_name("Has Spaces").is_err());
        assert!(validate_integration_name("UPPER").is_err());
        assert!(validate_integration_name(&"x".repeat(101)).is_err());
    }
}
