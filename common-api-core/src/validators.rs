//! Field validators used by [`JsonForm`](crate::JsonForm).

use std::sync::LazyLock;

use regex::Regex;

static USERNAME_CHARS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._]{4,20}$")
        .expect("valid username regex")
});

static DOUBLED_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[_.]{2}").expect("valid separator regex"));

static PHONE_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\+\d{1,2}\s)?\(?\d{3}\)?[\s.-]?\d{3}[\s.-]?\d{4}$")
        .expect("valid phone regex")
});

/// A validation failure for a single value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
    pub code: &'static str,
}

impl ValidationError {
    pub fn new(message: impl Into<String>, code: &'static str) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(message, "invalid")
    }
}

/// Checks a single string value.
pub trait Validator: Send + Sync {
    fn validate(&self, value: &str) -> Result<(), ValidationError>;
}

impl<F> Validator for F
where
    F: Fn(&str) -> Result<(), ValidationError> + Send + Sync,
{
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        self(value)
    }
}

/// 4 to 20 letters, digits, `.` or `_`; separators may not lead, trail or repeat.
#[derive(Clone, Copy, Debug, Default)]
pub struct UsernameValidator;

impl UsernameValidator {
    pub const MESSAGE: &'static str = "Enter a valid username. This value may contain only letters, \
         numbers, and (_, .) characters.";
}

impl Validator for UsernameValidator {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        let separator_at_edge = value.starts_with(['_', '.']) || value.ends_with(['_', '.']);

        if USERNAME_CHARS.is_match(value)
            && !separator_at_edge
            && !DOUBLED_SEPARATOR.is_match(value)
        {
            Ok(())
        } else {
            Err(ValidationError::invalid(Self::MESSAGE))
        }
    }
}

/// Phone numbers in international (`+1 555 123 4567`) or national format.
#[derive(Clone, Copy, Debug, Default)]
pub struct PhoneNumberValidator;

impl PhoneNumberValidator {
    pub const MESSAGE: &'static str = "Enter a valid number in international or national format.";
}

impl Validator for PhoneNumberValidator {
    fn validate(&self, value: &str) -> Result<(), ValidationError> {
        if PHONE_NUMBER.is_match(value) {
            Ok(())
        } else {
            Err(ValidationError::invalid(Self::MESSAGE))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_username_valid() {
        for name in ["alice", "bob.smith", "j_doe99", "abcd", "a.b_c.d"] {
            assert!(UsernameValidator.validate(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_username_invalid() {
        for name in [
            "abc",                       // too short
            "abcdefghijklmnopqrstu",     // too long
            "_alice",                    // leading separator
            "alice.",                    // trailing separator
            "al..ice",                   // doubled separator
            "al._ice",                   // mixed doubled separator
            "al ice",                    // space
            "alïce",                     // non ascii
        ] {
            let err = UsernameValidator.validate(name).unwrap_err();
            assert_eq!(err.code, "invalid", "{name}");
        }
    }

    #[test]
    fn test_phone_number() {
        for number in ["555-123-4567", "(555) 123-4567", "+1 555.123.4567", "5551234567"] {
            assert!(PhoneNumberValidator.validate(number).is_ok(), "{number}");
        }
        for number in ["12345", "+123 555 123 4567", "555-1234-567", "phone"] {
            assert!(PhoneNumberValidator.validate(number).is_err(), "{number}");
        }
    }

    #[test]
    fn test_closure_validator() {
        let not_admin = |value: &str| {
            if value == "admin" {
                Err(ValidationError::new("reserved", "reserved"))
            } else {
                Ok(())
            }
        };
        assert!(not_admin.validate("alice").is_ok());
        assert_eq!(not_admin.validate("admin").unwrap_err().code, "reserved");
    }
}
