//! Shared Error Types
//!
//! Errors raised while validating shared records, independent of storage or
//! transport.
//!
//! # Usage
//!
//! ```rust
//! use fieldops::shared::error::SharedError;
//!
//! let error = SharedError::validation("quantity", "quantity must be positive");
//! assert!(error.to_string().contains("quantity"));
//! ```
use thiserror::Error;

/// Shared error types for record validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SharedError {
    /// Data validation error
    #[error("Validation error in field '{field}': {message}")]
    ValidationError {
        /// The field that failed validation
        field: String,
        /// Human-readable error message
        message: String,
    },
}

impl SharedError {
    /// Create a new validation error
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ValidationError {
            field: field.into(),
            message: message.into(),
        }
    }
}
