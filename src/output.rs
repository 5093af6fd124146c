//! Row-oriented result files.
//!
//! The delimited writers flush after every row, so a file cut short by an
//! interrupt holds exactly the rows that were completed. The report workbook
//! is saved once per finished source.

use std::collections::HashSet;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use rust_xlsxwriter::{Format, Workbook, XlsxError};

use crate::bench::{QueryStatistics, RunResult};
use crate::config::FormatConfig;
use crate::error::{BenchError, Result};
use crate::locale::NumberFormat;

/// Written in place of an undefined mean or standard deviation.
pub const NOT_AVAILABLE: &str = "N/A";

/// Column headers of the benchmark results file.
pub const NLQ_COLUMN: &str = "NLQ";
pub const QUERY_NUMBER_COLUMN: &str = "Query Number";
pub const EXECUTION_PREFIX: &str = "Execution ";
pub const SUCCESSES_COLUMN: &str = "Successes";
pub const MEAN_COLUMN: &str = "Promedio";
pub const STD_DEV_COLUMN: &str = "Desviación";

fn csv_writer<W: io::Write>(writer: W, format: &FormatConfig) -> csv::Writer<W> {
    csv::WriterBuilder::new()
        .delimiter(format.delimiter_byte())
        .from_writer(writer)
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| {
            BenchError::output(format!("Cannot create directory {}: {e}", parent.display()))
        })?;
    }
    File::create(path)
        .map_err(|e| BenchError::output(format!("Cannot create {}: {e}", path.display())))
}

fn write_error(e: csv::Error) -> BenchError {
    BenchError::output(format!("Failed to write row: {e}"))
}

fn flush_error(e: io::Error) -> BenchError {
    BenchError::output(format!("Failed to flush row: {e}"))
}

/// Writes one row per benchmarked query variant.
pub struct BenchmarkWriter<W: io::Write> {
    writer: csv::Writer<W>,
    runs: usize,
    numbers: NumberFormat,
    rows: usize,
}

impl BenchmarkWriter<File> {
    /// Creates (truncates) the results file and writes the header.
    pub fn create(path: &Path, runs: usize, format: &FormatConfig) -> Result<Self> {
        Self::new(create_file(path)?, runs, format)
    }
}

impl<W: io::Write> BenchmarkWriter<W> {
    pub fn new(writer: W, runs: usize, format: &FormatConfig) -> Result<Self> {
        let mut this = Self {
            writer: csv_writer(writer, format),
            runs,
            numbers: NumberFormat::new(format.decimal_separator),
            rows: 0,
        };
        this.writer
            .write_record(benchmark_header(runs))
            .map_err(write_error)?;
        this.writer.flush().map_err(flush_error)?;
        Ok(this)
    }

    /// Writes and flushes one row.
    pub fn write_row(
        &mut self,
        nlq_label: &str,
        variant_number: u8,
        results: &[RunResult],
        stats: &QueryStatistics,
    ) -> Result<()> {
        if results.len() != self.runs {
            return Err(BenchError::internal(format!(
                "expected {} run results, got {}",
                self.runs,
                results.len()
            )));
        }

        let mut record = Vec::with_capacity(self.runs + 5);
        record.push(nlq_label.to_string());
        record.push(format!("Q{variant_number}"));
        record.extend(results.iter().map(|r| r.to_cell(&self.numbers)));
        record.push(stats.successes.to_string());
        record.push(self.optional(stats.mean));
        record.push(self.optional(stats.std_dev));

        self.writer.write_record(&record).map_err(write_error)?;
        self.writer.flush().map_err(flush_error)?;
        self.rows += 1;
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn rows_written(&self) -> usize {
        self.rows
    }

    /// Flushes and returns the inner writer.
    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| BenchError::output(format!("Failed to flush results: {e}")))
    }

    fn optional(&self, value: Option<f64>) -> String {
        value
            .map(|v| self.numbers.format(v))
            .unwrap_or_else(|| NOT_AVAILABLE.to_string())
    }
}

/// Header of a results file with `runs` execution columns.
pub fn benchmark_header(runs: usize) -> Vec<String> {
    let mut header = vec![NLQ_COLUMN.to_string(), QUERY_NUMBER_COLUMN.to_string()];
    header.extend((1..=runs).map(|i| format!("{EXECUTION_PREFIX}{i}")));
    header.push(SUCCESSES_COLUMN.to_string());
    header.push(MEAN_COLUMN.to_string());
    header.push(STD_DEV_COLUMN.to_string());
    header
}

/// One single-shot execution, as written to a report sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportEntry {
    pub nlq_id: String,
    pub variant_number: u8,
    pub sql: String,
    /// Result preview or `Error: ...`.
    pub result: String,
    /// Preview length in characters; 0 for errors.
    pub characters_returned: usize,
}

impl ReportEntry {
    /// `Q1`, `Q2`, ...
    pub fn query_name(&self) -> String {
        format!("Q{}", self.variant_number)
    }
}

pub const REPORT_HEADER: [&str; 6] = [
    "NLQ",
    "Query",
    "SQL",
    "Result",
    "Characters Returned",
    "Execution Accuracy",
];

/// Destination of report rows.
pub trait ReportSink {
    /// Records one row. The accuracy column stays blank for manual review.
    fn write_entry(&mut self, entry: &ReportEntry) -> Result<()>;
}

/// Writes one report sheet as a delimited file.
pub struct ReportWriter<W: io::Write> {
    writer: csv::Writer<W>,
    rows: usize,
}

impl ReportWriter<File> {
    pub fn create(path: &Path, format: &FormatConfig) -> Result<Self> {
        Self::new(create_file(path)?, format)
    }
}

impl<W: io::Write> ReportWriter<W> {
    pub fn new(writer: W, format: &FormatConfig) -> Result<Self> {
        let mut writer = csv_writer(writer, format);
        writer.write_record(REPORT_HEADER).map_err(write_error)?;
        writer.flush().map_err(flush_error)?;
        Ok(Self { writer, rows: 0 })
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| BenchError::output(format!("Failed to flush report: {e}")))
    }
}

impl<W: io::Write> ReportSink for ReportWriter<W> {
    /// Writes and flushes one row.
    fn write_entry(&mut self, entry: &ReportEntry) -> Result<()> {
        let characters = entry.characters_returned.to_string();
        let query = entry.query_name();
        self.writer
            .write_record([
                entry.nlq_id.as_str(),
                query.as_str(),
                entry.sql.as_str(),
                entry.result.as_str(),
                characters.as_str(),
                "",
            ])
            .map_err(write_error)?;
        self.writer.flush().map_err(flush_error)?;
        self.rows += 1;
        Ok(())
    }
}

/// Longest sheet name a workbook accepts.
pub const MAX_SHEET_NAME_CHARS: usize = 31;

/// Longest text a workbook cell accepts.
const MAX_CELL_CHARS: usize = 32_767;

const SQL_COLUMN_WIDTH: f64 = 60.0;

/// The report workbook, one sheet per LLM source.
///
/// Entries are kept in memory and the whole file is rewritten by [`save`],
/// which the report calls after each source.
///
/// [`save`]: ReportWorkbook::save
pub struct ReportWorkbook {
    path: PathBuf,
    sheets: Vec<(String, Vec<ReportEntry>)>,
}

impl ReportWorkbook {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sheets: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Starts the sheet for `source`; later entries go to it.
    ///
    /// Returns the sheet name, which is `source` made valid for a workbook.
    pub fn add_sheet(&mut self, source: &str) -> &str {
        let taken: HashSet<String> = self
            .sheets
            .iter()
            .map(|(name, _)| name.to_lowercase())
            .collect();
        let name = sheet_name(source, &taken);
        self.sheets.push((name, Vec::new()));
        self.sheets
            .last()
            .map(|(name, _)| name.as_str())
            .unwrap_or_default()
    }

    /// Sheet names and their row counts, in sheet order.
    pub fn sheets(&self) -> impl Iterator<Item = (&str, usize)> {
        self.sheets
            .iter()
            .map(|(name, entries)| (name.as_str(), entries.len()))
    }

    /// Writes every sheet to disk, replacing the previous file.
    pub fn save(&self) -> Result<()> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();

        for (name, entries) in &self.sheets {
            let sheet = workbook.add_worksheet();
            sheet.set_name(name).map_err(xlsx_error)?;
            for (col, title) in REPORT_HEADER.iter().enumerate() {
                sheet
                    .write_string_with_format(0, col as u16, *title, &bold)
                    .map_err(xlsx_error)?;
            }
            sheet.set_column_width(2, SQL_COLUMN_WIDTH).map_err(xlsx_error)?;
            sheet.set_column_width(3, SQL_COLUMN_WIDTH).map_err(xlsx_error)?;

            for (index, entry) in entries.iter().enumerate() {
                let row = index as u32 + 1;
                let query = entry.query_name();
                sheet
                    .write_string(row, 0, entry.nlq_id.as_str())
                    .map_err(xlsx_error)?;
                sheet.write_string(row, 1, query.as_str()).map_err(xlsx_error)?;
                sheet
                    .write_string(row, 2, cell_text(&entry.sql).as_str())
                    .map_err(xlsx_error)?;
                sheet
                    .write_string(row, 3, cell_text(&entry.result).as_str())
                    .map_err(xlsx_error)?;
                sheet
                    .write_number(row, 4, entry.characters_returned as f64)
                    .map_err(xlsx_error)?;
            }
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BenchError::output(format!("Cannot create directory {}: {e}", parent.display()))
            })?;
        }
        workbook.save(&self.path).map_err(|e| {
            BenchError::output(format!("Cannot save {}: {e}", self.path.display()))
        })
    }
}

impl ReportSink for ReportWorkbook {
    fn write_entry(&mut self, entry: &ReportEntry) -> Result<()> {
        let (_, entries) = self
            .sheets
            .last_mut()
            .ok_or_else(|| BenchError::internal("report entry written before any sheet"))?;
        entries.push(entry.clone());
        Ok(())
    }
}

fn xlsx_error(e: XlsxError) -> BenchError {
    BenchError::output(format!("Failed to write workbook: {e}"))
}

fn cell_text(text: &str) -> String {
    text.chars().take(MAX_CELL_CHARS).collect()
}

/// Makes `source` a valid sheet name not already in `taken` (lowercased).
///
/// Characters a workbook rejects become `_` and the name is cut to 31
/// characters; a clash gets a `~2`, `~3`... suffix.
pub fn sheet_name(source: &str, taken: &HashSet<String>) -> String {
    let cleaned: String = source
        .trim()
        .trim_matches('\'')
        .chars()
        .map(|c| match c {
            '[' | ']' | ':' | '*' | '?' | '/' | '\\' => '_',
            c => c,
        })
        .collect();
    let base = if cleaned.is_empty() {
        "Sheet".to_string()
    } else {
        cleaned
    };

    let mut name: String = base.chars().take(MAX_SHEET_NAME_CHARS).collect();
    let mut n = 2;
    while taken.contains(&name.to_lowercase()) {
        let suffix = format!("~{n}");
        let keep = MAX_SHEET_NAME_CHARS - suffix.chars().count();
        name = base.chars().take(keep).chain(suffix.chars()).collect();
        n += 1;
    }
    name
}
