//! # Symbology Module
//!
//! Retail 1D barcodes read by the software decoding engine: EAN-13, UPC-A,
//! EAN-8 and UPC-E. All four share the same digit alphabet, so the tables
//! live here and both [`encode`] and [`decode`] build on them.
//!
//! ## Digit Encoding
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Every digit is 7 modules wide and made of 4 runs.                     │
//! │                                                                         │
//! │  L code (odd parity)   space,bar,space,bar   0 = 3 2 1 1               │
//! │  G code (even parity)  reversed L widths     0 = 1 1 2 3               │
//! │  R code (right half)   bar,space,bar,space   0 = 3 2 1 1               │
//! │                                                                         │
//! │  EAN-13:  101 │ 6 × L/G │ 01010 │ 6 × R │ 101                           │
//! │           the L/G mix of the left half encodes the leading digit       │
//! │  EAN-8:   101 │ 4 × L   │ 01010 │ 4 × R │ 101                           │
//! │  UPC-E:   101 │ 6 × L/G │ 010101                                        │
//! │           the L/G mix encodes number system + check digit              │
//! │  UPC-A:   EAN-13 with a leading 0                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod decode;
pub mod encode;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::CoreError;

pub use decode::{decode_frame, decode_row, Barcode};
pub use encode::{modules, render_row};

// =============================================================================
// Symbology
// =============================================================================

/// A barcode symbology the software engine can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum Symbology {
    #[serde(rename = "ean_13")]
    Ean13,
    #[serde(rename = "upc_a")]
    UpcA,
    #[serde(rename = "ean_8")]
    Ean8,
    #[serde(rename = "upc_e")]
    UpcE,
}

impl Symbology {
    /// Every supported symbology, in decode priority order.
    pub const ALL: &'static [Symbology] = &[
        Symbology::Ean13,
        Symbology::UpcA,
        Symbology::Ean8,
        Symbology::UpcE,
    ];

    /// Number of digits in a complete payload, check digit included.
    pub fn digits(&self) -> usize {
        match self {
            Symbology::Ean13 => 13,
            Symbology::UpcA => 12,
            Symbology::Ean8 => 8,
            Symbology::UpcE => 8,
        }
    }
}

impl std::fmt::Display for Symbology {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbology::Ean13 => write!(f, "ean_13"),
            Symbology::UpcA => write!(f, "upc_a"),
            Symbology::Ean8 => write!(f, "ean_8"),
            Symbology::UpcE => write!(f, "upc_e"),
        }
    }
}

impl std::str::FromStr for Symbology {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ean_13" | "ean13" | "ean" | "ean_reader" => Ok(Symbology::Ean13),
            "upc_a" | "upca" | "upc" | "upc_reader" => Ok(Symbology::UpcA),
            "ean_8" | "ean8" | "ean_8_reader" => Ok(Symbology::Ean8),
            "upc_e" | "upce" | "upc_e_reader" => Ok(Symbology::UpcE),
            other => Err(CoreError::UnknownSymbology(other.to_string())),
        }
    }
}

// =============================================================================
// Shared Tables
// =============================================================================

/// Run widths of the L code for each digit (space, bar, space, bar).
/// R codes use the same widths starting with a bar; G codes reverse them.
pub(crate) const L_WIDTHS: [[u8; 4]; 10] = [
    [3, 2, 1, 1],
    [2, 2, 2, 1],
    [2, 1, 2, 2],
    [1, 4, 1, 1],
    [1, 1, 3, 2],
    [1, 2, 3, 1],
    [1, 1, 1, 4],
    [1, 3, 1, 2],
    [1, 2, 1, 3],
    [3, 1, 1, 2],
];

/// EAN-13 leading digit → G positions among the six left digits.
/// Bit 5 is the first left digit; a set bit means G code.
pub(crate) const EAN13_PARITY: [u8; 10] = [
    0b000000, 0b001011, 0b001101, 0b001110, 0b010011, 0b011001, 0b011100, 0b010101,
    0b010110, 0b011010,
];

/// UPC-E (number system 0) check digit → G positions of the six digits.
/// Number system 1 uses the complement.
pub(crate) const UPCE_PARITY_NS0: [u8; 10] = [
    0b111000, 0b110100, 0b110010, 0b110001, 0b101100, 0b100110, 0b100011, 0b101010,
    0b101001, 0b100101,
];

/// G widths for a digit.
pub(crate) fn g_widths(digit: u8) -> [u8; 4] {
    let l = L_WIDTHS[digit as usize];
    [l[3], l[2], l[1], l[0]]
}

/// UPC-E parity mask for a number system and check digit.
pub(crate) fn upce_parity(number_system: u8, check: u8) -> u8 {
    let ns0 = UPCE_PARITY_NS0[check as usize];
    if number_system == 0 {
        ns0
    } else {
        !ns0 & 0b111111
    }
}

/// Modulo-10 check digit used by every EAN/UPC variant.
///
/// `payload` is the digits without the check digit; weights alternate
/// 3,1,3,... starting from the rightmost digit.
pub fn check_digit(payload: &[u8]) -> u8 {
    let sum: u32 = payload
        .iter()
        .rev()
        .enumerate()
        .map(|(i, &d)| if i % 2 == 0 { d as u32 * 3 } else { d as u32 })
        .sum();
    ((10 - sum % 10) % 10) as u8
}

/// Expands a UPC-E body (number system + six digits) to the eleven UPC-A
/// digits that precede the check digit.
pub(crate) fn expand_upce(number_system: u8, d: &[u8; 6]) -> [u8; 11] {
    let ns = number_system;
    match d[5] {
        0..=2 => [ns, d[0], d[1], d[5], 0, 0, 0, 0, d[2], d[3], d[4]],
        3 => [ns, d[0], d[1], d[2], 0, 0, 0, 0, 0, d[3], d[4]],
        4 => [ns, d[0], d[1], d[2], d[3], 0, 0, 0, 0, 0, d[4]],
        _ => [ns, d[0], d[1], d[2], d[3], d[4], 0, 0, 0, 0, d[5]],
    }
}

/// Parses a string of ASCII digits.
pub(crate) fn parse_digits(text: &str) -> Option<Vec<u8>> {
    text.chars()
        .map(|c| c.to_digit(10).map(|d| d as u8))
        .collect()
}

/// Renders digits back to text.
pub(crate) fn digits_to_string(digits: &[u8]) -> String {
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_digit_known_values() {
        assert_eq!(check_digit(&parse_digits("590123412345").unwrap()), 7);
        assert_eq!(check_digit(&parse_digits("03600029145").unwrap()), 2);
        assert_eq!(check_digit(&parse_digits("9638507").unwrap()), 4);
    }

    #[test]
    fn test_upce_expansion() {
        // 0 425261 → 04210000526, check 4
        let expanded = expand_upce(0, &[4, 2, 5, 2, 6, 1]);
        assert_eq!(digits_to_string(&expanded), "04210000526");
        assert_eq!(check_digit(&expanded), 4);

        let expanded = expand_upce(0, &[1, 2, 3, 4, 5, 7]);
        assert_eq!(digits_to_string(&expanded), "01234500007");
    }

    #[test]
    fn test_parity_tables_are_distinct() {
        for (i, a) in EAN13_PARITY.iter().enumerate() {
            for b in &EAN13_PARITY[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(upce_parity(1, 0), 0b000111);
    }

    #[test]
    fn test_symbology_parsing() {
        assert_eq!("ean_reader".parse::<Symbology>().unwrap(), Symbology::Ean13);
        assert_eq!("EAN_8".parse::<Symbology>().unwrap(), Symbology::Ean8);
        assert_eq!("upc".parse::<Symbology>().unwrap(), Symbology::UpcA);
        assert_eq!("upc_e_reader".parse::<Symbology>().unwrap(), Symbology::UpcE);
        assert!("code_128".parse::<Symbology>().is_err());
        assert_eq!(Symbology::UpcE.to_string(), "upc_e");
    }
}
