//! Input validation for client names
//!
//! `ClientName` has a private field so the only way to build one is through
//! `new()`.

use std::fmt;

/// Validation errors for client input
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValidationError {
    #[error("Invalid length for {field}: expected {min}-{max}, got {actual}")]
    InvalidLength {
        field: &'static str,
        min: usize,
        max: usize,
        actual: usize,
    },

    #[error("Invalid format for {field}: '{value}' (expected: {expected})")]
    InvalidFormat {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// Validated client display name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientName(String);

impl ClientName {
    pub const MAX_LEN: usize = 128;

    /// Create a new validated ClientName
    ///
    /// # Validation Rules
    /// - Surrounding whitespace is trimmed
    /// - Length: 1-128 characters after trimming
    /// - No control characters
    ///
    /// # Examples
    /// ```
    /// use bank_transfer::account::validation::ClientName;
    ///
    /// let name = ClientName::new("  Alice ").unwrap();
    /// assert_eq!(name.as_str(), "Alice");
    ///
    /// assert!(ClientName::new("   ").is_err());
    /// ```
    pub fn new(name: &str) -> Result<Self, ValidationError> {
        let name = name.trim();
        let len = name.chars().count();

        if len == 0 || len > Self::MAX_LEN {
            return Err(ValidationError::InvalidLength {
                field: "name",
                min: 1,
                max: Self::MAX_LEN,
                actual: len,
            });
        }

        if name.chars().any(char::is_control) {
            return Err(ValidationError::InvalidFormat {
                field: "name",
                value: name.escape_debug().to_string(),
                expected: "printable characters only",
            });
        }

        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for ClientName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ClientName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
