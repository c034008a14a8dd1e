//! # Validation Module
//!
//! Validation of barcodes typed by hand into the scanner overlay.
//!
//! A typed code is free text as far as the search filter is concerned, so
//! only the shape is checked here: non-empty after trimming, bounded length,
//! no control characters. A purely numeric code of a retail length (8, 12
//! or 13 digits) additionally has its check digit verified, since a typo
//! there is almost always a misread digit.
//!
//! ## Usage
//! ```rust
//! use shelfscan_core::validation::validate_manual_code;
//!
//! assert_eq!(validate_manual_code("  5901234123457 ").unwrap(), "5901234123457");
//! assert!(validate_manual_code("").is_err());
//! ```

use crate::error::ValidationError;
use crate::symbology::{check_digit, parse_digits};
use crate::MAX_MANUAL_CODE_LEN;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Validates a manually entered barcode and returns it trimmed.
pub fn validate_manual_code(input: &str) -> ValidationResult<String> {
    let code = input.trim();

    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "barcode".to_string(),
        });
    }

    if code.chars().count() > MAX_MANUAL_CODE_LEN {
        return Err(ValidationError::TooLong {
            field: "barcode".to_string(),
            max: MAX_MANUAL_CODE_LEN,
        });
    }

    if code.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: "barcode".to_string(),
            reason: "must not contain control characters".to_string(),
        });
    }

    if let Some(digits) = parse_digits(code) {
        if matches!(digits.len(), 8 | 12 | 13) {
            let (payload, check) = digits.split_at(digits.len() - 1);
            if check_digit(payload) != check[0] {
                return Err(ValidationError::InvalidFormat {
                    field: "barcode".to_string(),
                    reason: "check digit does not match".to_string(),
                });
            }
        }
    }

    Ok(code.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_manual_code() {
        // Retail codes with valid check digits
        assert!(validate_manual_code("5901234123457").is_ok());
        assert!(validate_manual_code("036000291452").is_ok());
        assert!(validate_manual_code("96385074").is_ok());

        // Free-form internal codes
        assert_eq!(validate_manual_code(" SKU-0042 ").unwrap(), "SKU-0042");
        assert!(validate_manual_code("12345").is_ok());

        // Invalid
        assert!(validate_manual_code("").is_err());
        assert!(validate_manual_code("   ").is_err());
        assert!(validate_manual_code("5901234123450").is_err());
        assert!(validate_manual_code("ab\u{7}cd").is_err());
        assert!(validate_manual_code(&"9".repeat(65)).is_err());
    }
}
