//! Per-variant statistics over run results.

use crate::locale::{round4, NumberFormat};
use std::fmt;

use super::ErrorCategory;

/// Outcome of one execution attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RunResult {
    /// Elapsed seconds, rounded to four decimals.
    Elapsed(f64),
    Failed(ErrorCategory),
}

impl RunResult {
    /// Builds a timing result, rounding to four decimals.
    pub fn elapsed(seconds: f64) -> Self {
        Self::Elapsed(round4(seconds))
    }

    pub fn seconds(&self) -> Option<f64> {
        match self {
            Self::Elapsed(s) => Some(*s),
            Self::Failed(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Elapsed(_))
    }

    /// Renders the cell written into result files.
    pub fn to_cell(&self, format: &NumberFormat) -> String {
        match self {
            Self::Elapsed(s) => format.format(*s),
            Self::Failed(category) => category.label().to_string(),
        }
    }

    /// Parses a cell from a result file. Non-numeric text that is not a known
    /// label still counts as a failed run.
    pub fn from_cell(cell: &str, format: &NumberFormat) -> Option<Self> {
        if cell.trim().is_empty() {
            return None;
        }
        Some(match format.parse(cell) {
            Some(seconds) => Self::Elapsed(seconds),
            None => Self::Failed(
                ErrorCategory::from_label(cell).unwrap_or(ErrorCategory::GenericExecutionError),
            ),
        })
    }
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Elapsed(s) => write!(f, "{s}s"),
            Self::Failed(category) => write!(f, "{category}"),
        }
    }
}

/// Success count, mean and sample standard deviation of the timed runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryStatistics {
    pub successes: usize,
    /// Undefined without successful runs.
    pub mean: Option<f64>,
    /// Undefined with fewer than two successful runs.
    pub std_dev: Option<f64>,
}

impl QueryStatistics {
    pub fn from_results(results: &[RunResult]) -> Self {
        let times: Vec<f64> = results.iter().filter_map(RunResult::seconds).collect();
        Self::from_times(&times)
    }

    pub fn from_times(times: &[f64]) -> Self {
        let n = times.len();
        let mean = mean(times);
        let std_dev = match mean {
            Some(m) if n > 1 => {
                let sum_sq: f64 = times.iter().map(|t| (t - m).powi(2)).sum();
                Some((sum_sq / (n - 1) as f64).sqrt())
            }
            _ => None,
        };

        Self {
            successes: n,
            mean,
            std_dev,
        }
    }

    /// Fraction of the configured runs that produced a timing.
    pub fn success_rate(&self, runs: usize) -> f64 {
        if runs == 0 {
            return 0.0;
        }
        self.successes as f64 / runs as f64
    }
}

/// Success rate of an NLQ: the mean of its variants' success rates.
pub fn nlq_success_rate(variant_rates: &[f64]) -> Option<f64> {
    mean(variant_rates)
}

/// Arithmetic mean, undefined for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
