//! Number formatting at the file boundary.
//!
//! Spreadsheets saved under a Spanish locale use a comma as decimal separator.
//! Everything inside the crate works with `f64`; only this module knows about
//! separators.

/// Formats and parses decimal numbers with a configurable separator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberFormat {
    decimal_separator: char,
}

impl Default for NumberFormat {
    fn default() -> Self {
        Self::new('.')
    }
}

impl NumberFormat {
    pub fn new(decimal_separator: char) -> Self {
        Self { decimal_separator }
    }

    pub fn decimal_separator(&self) -> char {
        self.decimal_separator
    }

    /// Formats a value rounded to four decimals, without trailing zeros.
    pub fn format(&self, value: f64) -> String {
        let text = round4(value).to_string();
        if self.decimal_separator == '.' {
            text
        } else {
            text.replace('.', &self.decimal_separator.to_string())
        }
    }

    /// Parses a number written with either this format's separator or a plain dot.
    pub fn parse(&self, text: &str) -> Option<f64> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        let normalized = if self.decimal_separator == '.' {
            trimmed.to_string()
        } else {
            trimmed.replace(self.decimal_separator, ".")
        };
        normalized.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

/// Rounds to four decimal places.
pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}
