//! Colombian-peso display text: `$` prefix, `.` thousands, `,` decimals.
//!
//! Kept apart from the variance arithmetic so the numbers can be tested
//! without their presentation.

use num_format::{Locale, ToFormattedString as _};

/// Integer and cents of |value|, rounded half away from zero to 2 decimals.
fn split_cents(value: f64) -> (u64, u64) {
    let cents = (value.abs() * 100.0).round() as u64;
    (cents / 100, cents % 100)
}

/// `$78.480,18`; negative amounts get a leading `-`.
pub fn format_currency(amount: f64) -> String {
    let (integer, cents) = split_cents(amount);
    let sign = if amount < 0.0 && (integer, cents) != (0, 0) { "-" } else { "" };
    format!("{sign}${},{cents:02}", integer.to_formatted_string(&Locale::es))
}

/// Signed ratio as a percent with 2 decimals: `0.0764706` → `+7,65%`.
pub fn format_percent_signed(ratio: f64) -> String {
    let (integer, cents) = split_cents(ratio * 100.0);
    let sign = if (integer, cents) == (0, 0) {
        ""
    } else if ratio < 0.0 {
        "-"
    } else {
        "+"
    };
    format!("{sign}{},{cents:02}%", integer.to_formatted_string(&Locale::es))
}

/// Observation text for a flagged line. `amount` and `pct` follow the
/// (list − invoiced) convention: positive means invoiced below list.
pub fn observation(amount: f64, pct: f64) -> String {
    let relation = if pct >= 0.0 { "menor" } else { "mayor" };
    format!(
        "Precio total {relation} que la lista en {} ({}).",
        format_currency(amount.abs()),
        format_percent_signed(pct)
    )
}
