//! Email address validation.

/// Validation error for an account's email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Email address is empty.
    EmptyEmail,
    /// Email address format is invalid.
    InvalidEmail,
}

impl ValidationError {
    /// Get human-readable error message.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptyEmail => "Email address is required",
            Self::InvalidEmail => "Invalid email address format",
        }
    }

    /// Get the field name this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyEmail | Self::InvalidEmail => "email",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating an email address.
pub type ValidationResult = Result<(), ValidationError>;

/// Validate an email address.
///
/// # Errors
///
/// Returns `EmptyEmail` for blank input and `InvalidEmail` when the address
/// is not of the form `local@domain.tld`.
pub fn validate_email(email: &str) -> ValidationResult {
    if email.trim().is_empty() {
        return Err(ValidationError::EmptyEmail);
    }
    if is_valid_email(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail)
    }
}

/// Basic email validation.
fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }

    // Must contain exactly one @
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if domain.contains('@') {
        return false;
    }

    if local.is_empty() {
        return false;
    }

    // Domain must contain at least one dot and no empty labels
    if domain.is_empty() || !domain.contains('.') {
        return false;
    }
    !domain.split('.').any(str::is_empty)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_email() {
        assert!(is_valid_email("alice@bob.com"));
        assert!(is_valid_email("user.name@example.com"));
        assert!(is_valid_email("user+tag@sub.example.com"));
    }

    #[test]
    fn test_invalid_email() {
        assert!(!is_valid_email("ishallfail"));
        assert!(!is_valid_email("user"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("user@example"));
        assert!(!is_valid_email("user@@example.com"));
        assert!(!is_valid_email("user@example..com"));
        assert!(!is_valid_email("user name@example.com"));
    }

    #[test]
    fn test_validate_email_errors() {
        assert_eq!(validate_email("   "), Err(ValidationError::EmptyEmail));
        assert_eq!(validate_email("ishallfail"), Err(ValidationError::InvalidEmail));
        assert!(validate_email("alice@bob.com").is_ok());
    }

    #[test]
    fn test_error_metadata() {
        assert_eq!(ValidationError::InvalidEmail.field(), "email");
        assert_eq!(
            ValidationError::InvalidEmail.to_string(),
            "Invalid email address format"
        );
    }
}
