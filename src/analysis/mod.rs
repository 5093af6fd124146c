//! Plot-ready tables and charts from benchmark results.
//!
//! Reads a results file written by `bench` (or an older export with
//! `Run_<i>` columns and Latin-1 text), optionally joins a validation table,
//! and writes one CSV per chart plus the charts themselves as SVG: success
//! rates, heatmap, dispersion and time distributions. The VES chart is drawn
//! from its own table.

mod charts;
mod tables;
mod ves;

pub use charts::{
    draw_comparison, draw_dispersion, draw_heatmap, draw_success_rates, draw_time_distribution,
    render_charts, DrawResult, COMPARISON_CHART, DISPERSION_CHART, HEATMAP_CHART,
    SUCCESS_RATE_CHART, TIMES_CHART,
};
pub use ves::{draw_ves, load_ves, model_label, read_ves, render_ves_chart, VesTable, VES_CHART};

pub use tables::{
    dispersion, filtered_times, heatmap, quantile, success_rate_by_nlq, success_rate_comparison,
    time_summaries, write_tables, DispersionPoint, Heatmap, RateComparison, TimeSample,
    TimeSummary,
};

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use regex::Regex;
use tracing::{debug, warn};

use crate::bench::RunResult;
use crate::config::FormatConfig;
use crate::error::{BenchError, Result};
use crate::locale::NumberFormat;
use crate::output::{
    EXECUTION_PREFIX, MEAN_COLUMN, NLQ_COLUMN, QUERY_NUMBER_COLUMN, STD_DEV_COLUMN,
};
use crate::sheet::{self, HeaderRow, Table};

/// Execution column prefixes accepted on input, current first.
const RUN_PREFIXES: [&str; 3] = [EXECUTION_PREFIX, "Execution_", "Run_"];

/// Older exports name the query number column just `Query`.
const QUERY_COLUMN_ALIAS: &str = "Query";

/// Validation table columns.
pub const VALIDATION_ID_COLUMN: &str = "NLQ_ID";
pub const VALIDATION_RATE_COLUMN: &str = "Tasa_Exito_Validado";

/// One variant row of a results file.
#[derive(Debug, Clone, PartialEq)]
pub struct BenchmarkRow {
    pub nlq_id: u32,
    pub nlq_label: String,
    /// `Q1`, `Q2`, ...
    pub query_number: String,
    /// One entry per execution column; `None` for a blank cell.
    pub runs: Vec<Option<RunResult>>,
    pub mean: Option<f64>,
    pub std_dev: Option<f64>,
}

impl BenchmarkRow {
    /// Timed runs over execution columns, blanks counting as failures.
    pub fn success_rate(&self) -> f64 {
        if self.runs.is_empty() {
            return 0.0;
        }
        let successes = self
            .runs
            .iter()
            .filter(|r| r.is_some_and(|r| r.is_success()))
            .count();
        successes as f64 / self.runs.len() as f64
    }

    /// Elapsed seconds of the successful runs, with their 1-based run number.
    pub fn times(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.runs
            .iter()
            .enumerate()
            .filter_map(|(i, r)| r.and_then(|r| r.seconds()).map(|t| (i + 1, t)))
    }

    /// Numeric part of the query number, for ordering columns.
    pub fn variant_number(&self) -> Option<u8> {
        self.query_number.trim().strip_prefix('Q')?.parse().ok()
    }
}

/// Extracts the integer NLQ id from labels like `07 - Average temperature`.
pub struct NlqIdParser {
    pattern: Regex,
}

impl NlqIdParser {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(r"(\d+)\s*-")
            .map_err(|e| BenchError::internal(format!("invalid NLQ id pattern: {e}")))?;
        Ok(Self { pattern })
    }

    pub fn parse(&self, label: &str) -> Option<u32> {
        match self.pattern.captures(label) {
            Some(caps) => caps.get(1)?.as_str().parse().ok(),
            None => label.trim().parse().ok(),
        }
    }
}

/// Loads a results file, delimited or workbook.
pub fn load_results(path: &Path, format: &FormatConfig) -> Result<Vec<BenchmarkRow>> {
    let table = sheet::load_table(path, format, HeaderRow::First)?;
    results_from_table(&table, format, &path.display().to_string())
}

/// Reads delimited results from any reader; `source` names it in messages.
pub fn read_results<R: io::Read>(
    reader: R,
    format: &FormatConfig,
    source: &str,
) -> Result<Vec<BenchmarkRow>> {
    let table = sheet::read_delimited(reader, format.delimiter_byte(), 0, source)?;
    results_from_table(&table, format, source)
}

fn results_from_table(
    table: &Table,
    format: &FormatConfig,
    source: &str,
) -> Result<Vec<BenchmarkRow>> {
    let columns = ResultColumns::from_header(table, source)?;
    let ids = NlqIdParser::new()?;
    let numbers = NumberFormat::new(format.decimal_separator);
    let mut rows = Vec::new();

    for (line, row) in table.rows.iter().enumerate() {
        let cell = |index: usize| sheet::cell(row, index);

        let label = cell(columns.nlq);
        if label.is_empty() {
            continue;
        }
        let Some(nlq_id) = ids.parse(label) else {
            warn!("{source}: row {} has no numeric NLQ id ({label:?}), skipping", line + 2);
            continue;
        };

        rows.push(BenchmarkRow {
            nlq_id,
            nlq_label: label.to_string(),
            query_number: columns
                .query_number
                .map(|i| cell(i).to_string())
                .unwrap_or_default(),
            runs: columns
                .executions
                .iter()
                .map(|&i| RunResult::from_cell(cell(i), &numbers))
                .collect(),
            mean: columns.mean.and_then(|i| numbers.parse(cell(i))),
            std_dev: columns.std_dev.and_then(|i| numbers.parse(cell(i))),
        });
    }

    debug!("Loaded {} result rows from {source}", rows.len());
    Ok(rows)
}

/// Loads the validation table as NLQ id to validated success rate.
///
/// Several rows for one id are averaged.
pub fn load_validation(path: &Path, format: &FormatConfig) -> Result<BTreeMap<u32, f64>> {
    let table = sheet::load_table(path, format, HeaderRow::First)?;
    validation_from_table(&table, format, &path.display().to_string())
}

pub fn read_validation<R: io::Read>(
    reader: R,
    format: &FormatConfig,
    source: &str,
) -> Result<BTreeMap<u32, f64>> {
    let table = sheet::read_delimited(reader, format.delimiter_byte(), 0, source)?;
    validation_from_table(&table, format, source)
}

fn validation_from_table(
    table: &Table,
    format: &FormatConfig,
    source: &str,
) -> Result<BTreeMap<u32, f64>> {
    let id_col = table.require_column(VALIDATION_ID_COLUMN, source)?;
    let rate_col = table.require_column(VALIDATION_RATE_COLUMN, source)?;

    let numbers = NumberFormat::new(format.decimal_separator);
    let mut sums: BTreeMap<u32, (f64, usize)> = BTreeMap::new();

    for row in &table.rows {
        let id = sheet::cell(row, id_col);
        let rate = sheet::cell(row, rate_col);

        let (Some(id), Some(rate)) = (parse_id(id), numbers.parse(rate)) else {
            continue;
        };
        let entry = sums.entry(id).or_insert((0.0, 0));
        entry.0 += rate;
        entry.1 += 1;
    }

    Ok(sums
        .into_iter()
        .map(|(id, (sum, n))| (id, sum / n as f64))
        .collect())
}

/// Integer id cell; workbook cells may hold it as a whole float like `3.0`.
fn parse_id(text: &str) -> Option<u32> {
    text.parse::<u32>().ok().or_else(|| {
        let value: f64 = text.parse().ok()?;
        (value >= 0.0 && value.fract() == 0.0).then_some(value as u32)
    })
}

/// Column positions of a results file.
struct ResultColumns {
    nlq: usize,
    query_number: Option<usize>,
    executions: Vec<usize>,
    mean: Option<usize>,
    std_dev: Option<usize>,
}

impl ResultColumns {
    fn from_header(table: &Table, source: &str) -> Result<Self> {
        let nlq = table.require_column(NLQ_COLUMN, source)?;

        let mut executions: Vec<(usize, usize)> = table
            .header
            .iter()
            .enumerate()
            .filter_map(|(index, name)| Some((execution_number(name)?, index)))
            .collect();
        if executions.is_empty() {
            return Err(BenchError::input(format!(
                "{source}: no execution columns ('{EXECUTION_PREFIX}1', ...)"
            )));
        }
        executions.sort_unstable();

        Ok(Self {
            nlq,
            query_number: table
                .column(QUERY_NUMBER_COLUMN)
                .or_else(|| table.column(QUERY_COLUMN_ALIAS)),
            executions: executions.into_iter().map(|(_, index)| index).collect(),
            mean: table.column(MEAN_COLUMN),
            std_dev: table.column(STD_DEV_COLUMN),
        })
    }
}

/// Run number of an execution column: `Execution 3`, `Execution_3` or `Run_3`.
fn execution_number(column: &str) -> Option<usize> {
    RUN_PREFIXES
        .iter()
        .find_map(|prefix| column.strip_prefix(prefix))?
        .trim()
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bench::ErrorCategory;
    use pretty_assertions::assert_eq;

    fn semicolon() -> FormatConfig {
        FormatConfig {
            delimiter: ';',
            decimal_separator: ',',
            skip_rows: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_nlq_id_parser() {
        let ids = NlqIdParser::new().unwrap();
        assert_eq!(ids.parse("07 - Average temperature"), Some(7));
        assert_eq!(ids.parse("12- x"), Some(12));
        assert_eq!(ids.parse(" 3 "), Some(3));
        assert_eq!(ids.parse("Unknown"), None);
    }

    #[test]
    fn test_read_results() {
        let text = "NLQ,Query Number,Execution 1,Execution 2,Successes,Promedio,Desviación\n\
                    1 - Count,Q1,0.5,Timeout,1,0.5,N/A\n\
                    Unknown,Q1,0.1,0.1,2,0.1,0\n\
                    2 - List,Q2,,0.3,1,0.3,N/A\n";
        let rows = read_results(text.as_bytes(), &FormatConfig::default(), "t.csv").unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].nlq_id, 1);
        assert_eq!(rows[0].query_number, "Q1");
        assert_eq!(
            rows[0].runs,
            vec![
                Some(RunResult::Elapsed(0.5)),
                Some(RunResult::Failed(ErrorCategory::Timeout))
            ]
        );
        assert_eq!(rows[0].mean, Some(0.5));
        assert_eq!(rows[0].std_dev, None);
        assert_eq!(rows[0].success_rate(), 0.5);

        assert_eq!(rows[1].runs[0], None);
        assert_eq!(rows[1].success_rate(), 0.5);
        assert_eq!(rows[1].variant_number(), Some(2));
    }

    #[test]
    fn test_read_legacy_latin1_export() {
        let mut bytes = b"NLQ;Query Number;Run_2;Run_1;Promedio;Desviaci".to_vec();
        bytes.extend_from_slice(&[0xF3]); // 'ó' in Latin-1
        bytes.extend_from_slice(b"n\n4 - x;Q3;Error de sintaxis;0,25;0,25;N/A\n");

        let rows = read_results(bytes.as_slice(), &semicolon(), "old.csv").unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(
            rows[0].runs,
            vec![
                Some(RunResult::Elapsed(0.25)),
                Some(RunResult::Failed(ErrorCategory::SyntaxError))
            ]
        );
        assert_eq!(rows[0].std_dev, None);
        assert_eq!(rows[0].times().collect::<Vec<_>>(), vec![(1, 0.25)]);
    }

    #[test]
    fn test_underscore_execution_columns_and_query_alias() {
        let text = "NLQ,Query,Execution_1,Execution_2\n\
                    5 - Rain,Q4,0.2,Error de sintaxis\n";
        let rows = read_results(text.as_bytes(), &FormatConfig::default(), "t.csv").unwrap();

        assert_eq!(rows[0].query_number, "Q4");
        assert_eq!(rows[0].variant_number(), Some(4));
        assert_eq!(
            rows[0].runs,
            vec![
                Some(RunResult::Elapsed(0.2)),
                Some(RunResult::Failed(ErrorCategory::SyntaxError))
            ]
        );
    }

    #[test]
    fn test_execution_number() {
        assert_eq!(execution_number("Execution 10"), Some(10));
        assert_eq!(execution_number("Execution_2"), Some(2));
        assert_eq!(execution_number("Run_1"), Some(1));
        assert_eq!(execution_number("Executions"), None);
        assert_eq!(execution_number("Query Number"), None);
    }

    #[test]
    fn test_missing_execution_columns() {
        let text = "NLQ,Promedio\n1 - a,0.5\n";
        let err = read_results(text.as_bytes(), &FormatConfig::default(), "t").unwrap_err();
        assert!(err.to_string().contains("no execution columns"));
    }

    #[test]
    fn test_read_validation_averages_duplicates() {
        let text = "NLQ_ID;Tasa_Exito_Validado\n1;1\n2;0,5\n2;0\nx;1\n";
        let validation = read_validation(text.as_bytes(), &semicolon(), "v.csv").unwrap();
        assert_eq!(validation.len(), 2);
        assert_eq!(validation[&1], 1.0);
        assert_eq!(validation[&2], 0.25);
    }

    #[test]
    fn test_parse_id_accepts_whole_floats() {
        assert_eq!(parse_id("7"), Some(7));
        assert_eq!(parse_id("7.0"), Some(7));
        assert_eq!(parse_id("7.5"), None);
        assert_eq!(parse_id("x"), None);
    }

    #[test]
    fn test_validation_requires_columns() {
        let err = read_validation("id,rate\n1,1\n".as_bytes(), &FormatConfig::default(), "v")
            .unwrap_err();
        assert!(err.to_string().contains("NLQ_ID"));
    }
}
