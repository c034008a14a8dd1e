//! Scanline barcode decoding.
//!
//! ## Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  frame ──► sample rows (10%..90% of height)                            │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  row ──► threshold at (min+max)/2 ──► run lengths (light, dark, ...)   │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  for every dark run preceded by a quiet zone:                          │
//! │      estimate module width from the start guard                        │
//! │      try EAN-13/UPC-A, EAN-8, UPC-E in that order                      │
//! │      nearest-pattern match per digit, guards + quiet zone checked      │
//! │      check digit verified                                              │
//! │              │                                                          │
//! │              ▼                                                          │
//! │  retry on the mirrored row (code held upside down)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use super::{
    check_digit, digits_to_string, expand_upce, g_widths, upce_parity, Symbology, EAN13_PARITY,
    L_WIDTHS,
};
use crate::frame::GrayFrame;

/// Minimum luma spread for a row to be considered at all.
const MIN_CONTRAST: u8 = 48;

/// Light space required before the start guard and after the end guard.
const QUIET_ZONE_MODULES: f32 = 5.0;

/// Allowed deviation of a guard run from the module width.
const GUARD_TOLERANCE: f32 = 0.5;

/// Largest summed width error accepted for a digit match.
const MAX_DIGIT_ERROR: f32 = 1.2;

/// Rows sampled per frame.
const SAMPLE_ROWS: u32 = 9;

/// A decoded barcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Barcode {
    pub text: String,
    pub symbology: Symbology,
}

/// Decodes every distinct barcode found on the sampled rows of a frame.
pub fn decode_frame(frame: &GrayFrame, enabled: &[Symbology]) -> Vec<Barcode> {
    let mut found: Vec<Barcode> = Vec::new();

    for y in sample_rows(frame.height()) {
        let Some(row) = frame.row(y) else { continue };
        if let Some(code) = decode_row(row, enabled) {
            if !found.contains(&code) {
                found.push(code);
            }
        }
    }

    found
}

/// Decodes one scanline, trying the mirrored row as well.
pub fn decode_row(row: &[u8], enabled: &[Symbology]) -> Option<Barcode> {
    if enabled.is_empty() {
        return None;
    }
    let runs = run_lengths(row)?;
    if let Some(code) = decode_runs(&runs, enabled) {
        return Some(code);
    }
    let mirrored: Vec<usize> = runs.iter().rev().copied().collect();
    // Runs must start with a light run for the parity indexing below.
    let mirrored = if runs.len() % 2 == 1 {
        mirrored
    } else {
        let mut padded = Vec::with_capacity(mirrored.len() + 1);
        padded.push(0);
        padded.extend(mirrored);
        padded
    };
    decode_runs(&mirrored, enabled)
}

fn sample_rows(height: u32) -> Vec<u32> {
    if height <= SAMPLE_ROWS {
        return (0..height).collect();
    }
    let top = height / 10;
    let span = height - 2 * top;
    (0..SAMPLE_ROWS)
        .map(|i| top + span * i / (SAMPLE_ROWS - 1))
        .map(|y| y.min(height - 1))
        .collect()
}

/// Run lengths starting with a (possibly empty) light run, so even indices
/// are light and odd indices are dark.
fn run_lengths(row: &[u8]) -> Option<Vec<usize>> {
    let (min, max) = row
        .iter()
        .fold((u8::MAX, u8::MIN), |(lo, hi), &p| (lo.min(p), hi.max(p)));
    if max.saturating_sub(min) < MIN_CONTRAST {
        return None;
    }
    let threshold = ((min as u16 + max as u16) / 2) as u8;

    let mut runs = vec![0usize];
    let mut dark = false;
    for &p in row {
        let is_dark = p < threshold;
        if is_dark != dark {
            runs.push(0);
            dark = is_dark;
        }
        let last = runs.len() - 1;
        runs[last] += 1;
    }
    Some(runs)
}

fn decode_runs(runs: &[usize], enabled: &[Symbology]) -> Option<Barcode> {
    let wants = |s: Symbology| enabled.contains(&s);

    for start in (1..runs.len()).step_by(2) {
        let Some(module) = start_guard(runs, start) else { continue };

        if wants(Symbology::Ean13) || wants(Symbology::UpcA) {
            if let Some(digits) = read_ean13(runs, start, module) {
                if wants(Symbology::Ean13) {
                    return Some(Barcode {
                        text: digits_to_string(&digits),
                        symbology: Symbology::Ean13,
                    });
                }
                if digits[0] == 0 {
                    return Some(Barcode {
                        text: digits_to_string(&digits[1..]),
                        symbology: Symbology::UpcA,
                    });
                }
            }
        }

        if wants(Symbology::Ean8) {
            if let Some(digits) = read_ean8(runs, start, module) {
                return Some(Barcode {
                    text: digits_to_string(&digits),
                    symbology: Symbology::Ean8,
                });
            }
        }

        if wants(Symbology::UpcE) {
            if let Some(digits) = read_upce(runs, start, module) {
                return Some(Barcode {
                    text: digits_to_string(&digits),
                    symbology: Symbology::UpcE,
                });
            }
        }
    }

    None
}

// =============================================================================
// Symbol Readers
// =============================================================================

fn read_ean13(runs: &[usize], start: usize, module: f32) -> Option<[u8; 13]> {
    let mut digits = [0u8; 13];
    let mut parity = 0u8;
    let mut pos = start + 3;

    for k in 0..6 {
        let (d, is_g) = read_digit(runs, pos, module, true)?;
        digits[k + 1] = d;
        if is_g {
            parity |= 1 << (5 - k);
        }
        pos += 4;
    }
    guard(runs, pos, 5, module)?;
    pos += 5;
    for k in 0..6 {
        let (d, _) = read_digit(runs, pos, module, false)?;
        digits[k + 7] = d;
        pos += 4;
    }
    guard(runs, pos, 3, module)?;
    quiet_zone(runs, pos + 3, module)?;

    digits[0] = EAN13_PARITY.iter().position(|&p| p == parity)? as u8;
    (check_digit(&digits[..12]) == digits[12]).then_some(digits)
}

fn read_ean8(runs: &[usize], start: usize, module: f32) -> Option<[u8; 8]> {
    let mut digits = [0u8; 8];
    let mut pos = start + 3;

    for slot in digits.iter_mut().take(4) {
        *slot = read_digit(runs, pos, module, false)?.0;
        pos += 4;
    }
    guard(runs, pos, 5, module)?;
    pos += 5;
    for slot in digits.iter_mut().skip(4) {
        *slot = read_digit(runs, pos, module, false)?.0;
        pos += 4;
    }
    guard(runs, pos, 3, module)?;
    quiet_zone(runs, pos + 3, module)?;

    (check_digit(&digits[..7]) == digits[7]).then_some(digits)
}

fn read_upce(runs: &[usize], start: usize, module: f32) -> Option<[u8; 8]> {
    let mut body = [0u8; 6];
    let mut parity = 0u8;
    let mut pos = start + 3;

    for (k, slot) in body.iter_mut().enumerate() {
        let (d, is_g) = read_digit(runs, pos, module, true)?;
        *slot = d;
        if is_g {
            parity |= 1 << (5 - k);
        }
        pos += 4;
    }
    guard(runs, pos, 6, module)?;
    quiet_zone(runs, pos + 6, module)?;

    for number_system in 0..=1u8 {
        for check in 0..10u8 {
            if upce_parity(number_system, check) != parity {
                continue;
            }
            if check_digit(&expand_upce(number_system, &body)) != check {
                return None;
            }
            let mut digits = [0u8; 8];
            digits[0] = number_system;
            digits[1..7].copy_from_slice(&body);
            digits[7] = check;
            return Some(digits);
        }
    }
    None
}

// =============================================================================
// Run Matching
// =============================================================================

/// Validates a start guard (bar, space, bar) with a quiet zone in front and
/// returns the module width it implies.
fn start_guard(runs: &[usize], start: usize) -> Option<f32> {
    let bars = runs.get(start..start + 3)?;
    let module = bars.iter().sum::<usize>() as f32 / 3.0;
    if module < 1.0 {
        return None;
    }
    guard(runs, start, 3, module)?;
    let before = *runs.get(start.checked_sub(1)?)? as f32;
    (before >= QUIET_ZONE_MODULES * module).then_some(module)
}

/// Checks `len` runs at `at` are each one module wide.
fn guard(runs: &[usize], at: usize, len: usize, module: f32) -> Option<()> {
    let slice = runs.get(at..at + len)?;
    slice
        .iter()
        .all(|&w| (w as f32 - module).abs() <= GUARD_TOLERANCE * module + 0.5)
        .then_some(())
}

fn quiet_zone(runs: &[usize], at: usize, module: f32) -> Option<()> {
    let width = *runs.get(at)? as f32;
    (width >= QUIET_ZONE_MODULES * module).then_some(())
}

/// Matches four runs against the L (and optionally G) width tables.
/// Returns the digit and whether it was a G code.
fn read_digit(runs: &[usize], at: usize, module: f32, allow_g: bool) -> Option<(u8, bool)> {
    let widths = runs.get(at..at + 4)?;
    let total = widths.iter().sum::<usize>() as f32;
    if (total - 7.0 * module).abs() > 2.5 * module {
        return None;
    }
    let scaled: Vec<f32> = widths.iter().map(|&w| w as f32 * 7.0 / total).collect();
    let error = |pattern: [u8; 4]| -> f32 {
        scaled
            .iter()
            .zip(pattern)
            .map(|(s, p)| (s - p as f32).abs())
            .sum()
    };

    let mut best: Option<(u8, bool, f32)> = None;
    for digit in 0..10u8 {
        let mut candidates = vec![(false, L_WIDTHS[digit as usize])];
        if allow_g {
            candidates.push((true, g_widths(digit)));
        }
        for (is_g, pattern) in candidates {
            let e = error(pattern);
            if best.map_or(true, |(_, _, b)| e < b) {
                best = Some((digit, is_g, e));
            }
        }
    }

    best.filter(|&(_, _, e)| e <= MAX_DIGIT_ERROR)
        .map(|(digit, is_g, _)| (digit, is_g))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbology::render_row;

    fn frame_for(payload: &str, symbology: Symbology) -> GrayFrame {
        let row = render_row(payload, symbology, 2).unwrap();
        GrayFrame::from_row(&row, 20)
    }

    #[test]
    fn test_decodes_each_symbology() {
        let cases = [
            ("5901234123457", Symbology::Ean13, "5901234123457"),
            ("96385074", Symbology::Ean8, "96385074"),
            ("04252614", Symbology::UpcE, "04252614"),
        ];
        for (payload, symbology, expected) in cases {
            let found = decode_frame(&frame_for(payload, symbology), Symbology::ALL);
            assert_eq!(found.len(), 1, "{}", payload);
            assert_eq!(found[0].text, expected);
            assert_eq!(found[0].symbology, symbology);
        }
    }

    #[test]
    fn test_upc_a_reported_when_ean13_disabled() {
        let frame = frame_for("036000291452", Symbology::UpcA);

        let found = decode_frame(&frame, &[Symbology::UpcA]);
        assert_eq!(found[0].text, "036000291452");
        assert_eq!(found[0].symbology, Symbology::UpcA);

        let found = decode_frame(&frame, Symbology::ALL);
        assert_eq!(found[0].text, "0036000291452");
        assert_eq!(found[0].symbology, Symbology::Ean13);
    }

    #[test]
    fn test_mirrored_row_decodes() {
        let mut row = render_row("5901234123457", Symbology::Ean13, 3).unwrap();
        row.reverse();
        let code = decode_row(&row, Symbology::ALL).unwrap();
        assert_eq!(code.text, "5901234123457");
    }

    #[test]
    fn test_scaled_and_offset_row_decodes() {
        let mut row = vec![200u8; 37];
        let bars = render_row("96385074", Symbology::Ean8, 4).unwrap();
        // Camera-like levels: dark grey bars on light grey paper.
        row.extend(bars.iter().map(|&p| if p == 0 { 40 } else { 200 }));
        let code = decode_row(&row, &[Symbology::Ean8]).unwrap();
        assert_eq!(code.text, "96385074");
    }

    #[test]
    fn test_disabled_symbology_is_ignored() {
        let frame = frame_for("96385074", Symbology::Ean8);
        assert!(decode_frame(&frame, &[Symbology::Ean13, Symbology::UpcE]).is_empty());
        assert!(decode_frame(&frame, &[]).is_empty());
    }

    #[test]
    fn test_blank_and_low_contrast_frames_yield_nothing() {
        assert!(decode_frame(&GrayFrame::blank(320, 240, 128), Symbology::ALL).is_empty());

        let row: Vec<u8> = (0..300).map(|i| if i % 4 < 2 { 120 } else { 140 }).collect();
        assert!(decode_row(&row, Symbology::ALL).is_none());
    }

    #[test]
    fn test_corrupted_digit_fails_checksum() {
        let mut row = render_row("5901234123457", Symbology::Ean13, 2).unwrap();
        // Swap the last R digit (7 → 1): 3,1,1,... no longer matches the check digit.
        let quiet = 10 * 2;
        let last_digit = quiet + (95 - 3 - 7) * 2;
        let replacement = [0u8, 0, 0, 0, 255, 255, 255, 255, 0, 0, 0, 0, 255, 255];
        row[last_digit..last_digit + 14].copy_from_slice(&replacement);
        assert!(decode_row(&row, Symbology::ALL).is_none());
    }
}
