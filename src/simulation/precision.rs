// src/simulation/precision.rs
//! Decimal precision helpers
//!
//! The precision of generated values is taken from the *text* of the
//! configured bounds, so `"1.50"` yields two fractional digits even though
//! it parses to `1.5`.

/// Number of digits after the decimal point in `raw` (0 if none)
pub fn fractional_digits(raw: &str) -> u32 {
    let trimmed = raw.trim();
    match trimmed.find('.') {
        Some(idx) => trimmed[idx + 1..]
            .chars()
            .take_while(|c| c.is_ascii_digit())
            .count() as u32,
        None => 0,
    }
}

/// Round `value` to `digits` fractional digits, half away from zero
pub fn round_to(value: f64, digits: u32) -> f64 {
    let power = 10f64.powi(digits as i32).max(1.0);
    let rounded = (value * power).round() / power;
    // avoid reporting "-0"
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
