//! Error types for status report parsing

use thiserror::Error;

use crate::fields::Field;

/// A recognised field whose value could not be parsed
///
/// These are reported per field and never fail a whole poll.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// Value is not a number of the expected type
    #[error("{field}: invalid number {text:?}")]
    InvalidNumber { field: Field, text: String },

    /// Line did not follow the field's layout
    #[error("{field}: malformed value {text:?}")]
    Malformed { field: Field, text: String },
}

impl FieldError {
    /// The field that failed to parse
    pub fn field(&self) -> Field {
        match self {
            FieldError::InvalidNumber { field, .. } | FieldError::Malformed { field, .. } => *field,
        }
    }
}
