//! Error types for name parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating names.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The value is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The value exceeds the maximum length.
    #[error("{kind} is too long: {len} bytes (max {max})")]
    TooLong {
        kind: &'static str,
        len: usize,
        max: usize,
    },

    /// The value contains a character the type does not allow.
    #[error("{kind} contains invalid character {ch:?}")]
    InvalidCharacter { kind: &'static str, ch: char },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty { .. })
    }

    /// The kind of name that failed validation.
    pub fn kind(&self) -> &'static str {
        match self {
            IdError::Empty { kind }
            | IdError::TooLong { kind, .. }
            | IdError::InvalidCharacter { kind, .. } => kind,
        }
    }
}
