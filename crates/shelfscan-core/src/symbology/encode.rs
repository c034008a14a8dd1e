//! Barcode rendering.
//!
//! Turns a payload into its module pattern and then into an ideal scanline.
//! The simulated camera draws its test pattern with this, and the decoder
//! tests synthesise their input with it.

use super::{
    check_digit, digits_to_string, expand_upce, g_widths, parse_digits, upce_parity, Symbology,
    EAN13_PARITY, L_WIDTHS,
};
use crate::error::{CoreError, CoreResult};

/// Light modules rendered on each side of the symbol.
pub const QUIET_ZONE_MODULES: usize = 10;

const BAR: u8 = 0;
const SPACE: u8 = 255;

/// Returns the module pattern (`true` = bar) for a payload, quiet zones
/// excluded.
///
/// The payload may omit the check digit; if present it must be correct.
pub fn modules(payload: &str, symbology: Symbology) -> CoreResult<Vec<bool>> {
    let digits = complete_payload(payload, symbology)?;
    let mut out = Vec::with_capacity(95);

    match symbology {
        Symbology::Ean13 | Symbology::UpcA => {
            let digits = if symbology == Symbology::UpcA {
                let mut ean = vec![0];
                ean.extend_from_slice(&digits);
                ean
            } else {
                digits
            };
            let parity = EAN13_PARITY[digits[0] as usize];
            push_guard(&mut out, &[true, false, true]);
            for (k, &d) in digits[1..7].iter().enumerate() {
                let is_g = parity & (1 << (5 - k)) != 0;
                push_digit(&mut out, left_widths(d, is_g), false);
            }
            push_guard(&mut out, &[false, true, false, true, false]);
            for &d in &digits[7..13] {
                push_digit(&mut out, L_WIDTHS[d as usize], true);
            }
            push_guard(&mut out, &[true, false, true]);
        }
        Symbology::Ean8 => {
            push_guard(&mut out, &[true, false, true]);
            for &d in &digits[0..4] {
                push_digit(&mut out, L_WIDTHS[d as usize], false);
            }
            push_guard(&mut out, &[false, true, false, true, false]);
            for &d in &digits[4..8] {
                push_digit(&mut out, L_WIDTHS[d as usize], true);
            }
            push_guard(&mut out, &[true, false, true]);
        }
        Symbology::UpcE => {
            let parity = upce_parity(digits[0], digits[7]);
            push_guard(&mut out, &[true, false, true]);
            for (k, &d) in digits[1..7].iter().enumerate() {
                let is_g = parity & (1 << (5 - k)) != 0;
                push_digit(&mut out, left_widths(d, is_g), false);
            }
            push_guard(&mut out, &[false, true, false, true, false, true]);
        }
    }

    Ok(out)
}

/// Renders an ideal scanline: black bars on white, `module_px` pixels per
/// module, with quiet zones on both sides.
pub fn render_row(payload: &str, symbology: Symbology, module_px: usize) -> CoreResult<Vec<u8>> {
    let pattern = modules(payload, symbology)?;
    let module_px = module_px.max(1);
    let total = (pattern.len() + 2 * QUIET_ZONE_MODULES) * module_px;

    let mut row = Vec::with_capacity(total);
    row.resize(QUIET_ZONE_MODULES * module_px, SPACE);
    for bar in pattern {
        let value = if bar { BAR } else { SPACE };
        row.extend(std::iter::repeat(value).take(module_px));
    }
    row.resize(total, SPACE);
    Ok(row)
}

/// Validates a payload and returns its full digit list, check digit
/// appended when it was omitted.
fn complete_payload(payload: &str, symbology: Symbology) -> CoreResult<Vec<u8>> {
    let unencodable = |reason: &str| CoreError::UnencodablePayload {
        payload: payload.to_string(),
        symbology: symbology.to_string(),
        reason: reason.to_string(),
    };

    let mut digits = parse_digits(payload).ok_or_else(|| unencodable("digits only"))?;
    let full = symbology.digits();

    if digits.len() != full && digits.len() != full - 1 {
        return Err(unencodable(&format!("expected {} or {} digits", full - 1, full)));
    }

    let expected = match symbology {
        Symbology::UpcE => {
            if digits[0] > 1 {
                return Err(unencodable("number system must be 0 or 1"));
            }
            let mut body = [0u8; 6];
            body.copy_from_slice(&digits[1..7]);
            check_digit(&expand_upce(digits[0], &body))
        }
        _ => check_digit(&digits[..full - 1]),
    };

    if digits.len() == full {
        if digits[full - 1] != expected {
            return Err(CoreError::ChecksumMismatch {
                payload: digits_to_string(&digits),
                expected,
            });
        }
    } else {
        digits.push(expected);
    }

    Ok(digits)
}

fn left_widths(digit: u8, is_g: bool) -> [u8; 4] {
    if is_g {
        g_widths(digit)
    } else {
        L_WIDTHS[digit as usize]
    }
}

fn push_guard(out: &mut Vec<bool>, pattern: &[bool]) {
    out.extend_from_slice(pattern);
}

fn push_digit(out: &mut Vec<bool>, widths: [u8; 4], starts_with_bar: bool) {
    let mut bar = starts_with_bar;
    for w in widths {
        out.extend(std::iter::repeat(bar).take(w as usize));
        bar = !bar;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_counts() {
        assert_eq!(modules("5901234123457", Symbology::Ean13).unwrap().len(), 95);
        assert_eq!(modules("03600029145", Symbology::UpcA).unwrap().len(), 95);
        assert_eq!(modules("9638507", Symbology::Ean8).unwrap().len(), 67);
        assert_eq!(modules("0425261", Symbology::UpcE).unwrap().len(), 51);
    }

    #[test]
    fn test_ean13_starts_with_guard_and_first_l_digit() {
        let m = modules("5901234123457", Symbology::Ean13).unwrap();
        // Guard 101, then digit 9 in L code (leading 5 → LGGLLG): 0001011
        let head: Vec<bool> = m[..10].to_vec();
        let expected = [
            true, false, true, false, false, false, true, false, true, true,
        ];
        assert_eq!(head, expected);
    }

    #[test]
    fn test_rejects_bad_payloads() {
        assert!(matches!(
            modules("5901234123450", Symbology::Ean13),
            Err(CoreError::ChecksumMismatch { expected: 7, .. })
        ));
        assert!(matches!(
            modules("12AB", Symbology::Ean8),
            Err(CoreError::UnencodablePayload { .. })
        ));
        assert!(matches!(
            modules("5425261", Symbology::UpcE),
            Err(CoreError::UnencodablePayload { .. })
        ));
    }

    #[test]
    fn test_render_row_has_quiet_zones() {
        let row = render_row("9638507", Symbology::Ean8, 3).unwrap();
        assert_eq!(row.len(), (67 + 2 * QUIET_ZONE_MODULES) * 3);
        assert!(row[..QUIET_ZONE_MODULES * 3].iter().all(|&p| p == SPACE));
        assert_eq!(row[QUIET_ZONE_MODULES * 3], BAR);
        assert!(row[row.len() - QUIET_ZONE_MODULES * 3..].iter().all(|&p| p == SPACE));
    }
}
