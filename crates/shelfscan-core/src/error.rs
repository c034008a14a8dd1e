//! # Error Types
//!
//! Domain-specific error types for shelfscan-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  shelfscan-core errors (this file)                                     │
//! │  ├── CoreError        - Symbology / frame errors                       │
//! │  └── ValidationError  - Manual entry and input validation failures     │
//! │                                                                         │
//! │  shelfscan-capture errors (separate crate)                             │
//! │  └── ScanError        - Camera, decoder and config failures            │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → ScanError → on_error / UI         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised by the pure scanning logic.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A payload cannot be represented in the requested symbology.
    ///
    /// ## When This Occurs
    /// - Wrong number of digits (EAN-13 needs 12 or 13)
    /// - Non-digit characters
    /// - UPC-E number system other than 0 or 1
    #[error("Cannot encode '{payload}' as {symbology}: {reason}")]
    UnencodablePayload {
        payload: String,
        symbology: String,
        reason: String,
    },

    /// Check digit does not match the payload.
    #[error("Check digit mismatch for '{payload}': expected {expected}")]
    ChecksumMismatch { payload: String, expected: u8 },

    /// Frame buffer size does not match its dimensions.
    #[error("Frame buffer holds {actual} bytes, expected {expected} ({width}x{height})")]
    FrameSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    /// Symbology name not recognised.
    #[error("Unknown symbology: '{0}'")]
    UnknownSymbology(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::ChecksumMismatch {
            payload: "5901234123450".to_string(),
            expected: 7,
        };
        assert_eq!(
            err.to_string(),
            "Check digit mismatch for '5901234123450': expected 7"
        );

        let err = ValidationError::Required {
            field: "barcode".to_string(),
        };
        assert_eq!(err.to_string(), "barcode is required");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let err: CoreError = ValidationError::TooLong {
            field: "barcode".to_string(),
            max: 64,
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
