//! Currency descriptors and minor-unit money conversion.
//!
//! Spreadsheet backends hand currency cells over as floating point numbers, so
//! money is kept as an integer count of minor units (cents) and converted at
//! the cell boundary only.

use serde::{Deserialize, Serialize};

/// Largest minor-unit exponent whose scale fits `i64`.
pub const N_MINOR_UNIT_MAX: u32 = 18;

/// Currency metadata attached to a money field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpecCurrency {
    /// Display code, e.g. `€` or `CHF`.
    pub code: String,
    /// Decimal exponent of the minor unit (`2` = 100 minor units per unit).
    pub minor_unit: u32,
    /// Whether the code precedes the amount in display text.
    pub code_before_amount: bool,
    /// Decimal delimiter used in display text.
    pub delimiter: String,
    /// Thousands separator used in display text.
    pub thousands_separator: String,
}

impl SpecCurrency {
    /// Euro.
    pub fn euro() -> Self {
        Self {
            code: "€".to_string(),
            minor_unit: 2,
            code_before_amount: false,
            delimiter: ",".to_string(),
            thousands_separator: ".".to_string(),
        }
    }

    /// Swiss franc.
    pub fn swiss_franc() -> Self {
        Self {
            code: "CHF".to_string(),
            minor_unit: 2,
            code_before_amount: false,
            delimiter: ".".to_string(),
            thousands_separator: " ".to_string(),
        }
    }

    /// United States dollar.
    pub fn united_states_dollar() -> Self {
        Self {
            code: "$".to_string(),
            minor_unit: 2,
            code_before_amount: true,
            delimiter: ".".to_string(),
            thousands_separator: ",".to_string(),
        }
    }

    /// Whether the minor unit is small enough for integer amounts.
    pub fn is_supported(&self) -> bool {
        self.minor_unit <= N_MINOR_UNIT_MAX
    }

    /// Minor units per major unit. Saturates past [`N_MINOR_UNIT_MAX`].
    pub fn scale(&self) -> i64 {
        10_i64.saturating_pow(self.minor_unit)
    }

    /// Convert a major-unit amount into minor units, rounding half away from zero.
    ///
    /// Returns `None` for non-finite input or amounts outside `i64`.
    pub fn to_minor(&self, amount: f64) -> Option<i64> {
        if !amount.is_finite() {
            return None;
        }
        let n_scaled = (amount * self.scale() as f64).round();
        if n_scaled < i64::MIN as f64 || n_scaled > i64::MAX as f64 {
            return None;
        }
        Some(n_scaled as i64)
    }

    /// Convert minor units into the major-unit number written to a cell.
    pub fn to_major(&self, amount_minor: i64) -> f64 {
        amount_minor as f64 / self.scale() as f64
    }

    /// Excel number format code: positive amounts plain, negatives red.
    ///
    /// Separators in the code are locale-neutral placeholders (`,` thousands,
    /// `.` decimal); the spreadsheet application renders them per locale.
    pub fn number_format(&self) -> String {
        let c_digits = if self.minor_unit == 0 {
            "#,##0".to_string()
        } else {
            format!("#,##0.{}", "0".repeat(self.minor_unit as usize))
        };
        let c_code = format!("\"{}\"", self.code.replace('"', ""));
        let c_amount = if self.code_before_amount {
            format!("{c_code} {c_digits}")
        } else {
            format!("{c_digits} {c_code}")
        };
        format!("{c_amount};[Red]-{c_amount}")
    }

    /// Human display text, e.g. `1.234,56 €`.
    pub fn format_amount(&self, amount_minor: i64) -> String {
        let n_scale = self.scale().unsigned_abs();
        let n_abs = amount_minor.unsigned_abs();
        let n_major = n_abs / n_scale;
        let n_minor = n_abs % n_scale;

        let c_major_digits = n_major.to_string();
        let mut l_groups: Vec<&str> = Vec::new();
        let mut n_end = c_major_digits.len();
        while n_end > 3 {
            l_groups.push(&c_major_digits[n_end - 3..n_end]);
            n_end -= 3;
        }
        l_groups.push(&c_major_digits[..n_end]);
        l_groups.reverse();

        let mut c_number = l_groups.join(&self.thousands_separator);
        if self.minor_unit > 0 {
            c_number = format!(
                "{c_number}{}{n_minor:0width$}",
                self.delimiter,
                width = self.minor_unit as usize
            );
        }
        if amount_minor < 0 {
            c_number = format!("-{c_number}");
        }

        if self.code_before_amount {
            format!("{} {c_number}", self.code)
        } else {
            format!("{c_number} {}", self.code)
        }
    }

    /// Parse display text produced by [`Self::format_amount`] (or plain numeric
    /// text) into minor units.
    pub fn parse_amount(&self, text: &str) -> Option<i64> {
        let mut c_text = text.trim().replace(&self.code, "");
        if !self.thousands_separator.is_empty() {
            c_text = c_text.replace(&self.thousands_separator, "");
        }
        if self.delimiter != "." {
            c_text = c_text.replace(&self.delimiter, ".");
        }
        let c_text: String = c_text.chars().filter(|chr| !chr.is_whitespace()).collect();
        if c_text.is_empty() {
            return None;
        }
        self.to_minor(c_text.parse::<f64>().ok()?)
    }
}
