//! Tabular input files: delimited text or spreadsheet workbooks.
//!
//! Query files, results, validation tables and VES tables all arrive either
//! as delimited text or as a workbook exported from a spreadsheet. Both are
//! read into a [`Table`] of trimmed strings; the file extension picks the
//! reader.

use std::fs::File;
use std::io;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use tracing::debug;

use crate::config::FormatConfig;
use crate::error::{BenchError, Result};

const WORKBOOK_EXTENSIONS: [&str; 5] = ["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Where the header row sits in a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderRow {
    /// The first row is the header.
    First,
    /// Title rows precede the header: `skip_rows` lines of a delimited file,
    /// or every row above `sheet_header_row` of a workbook.
    AfterTitles,
}

/// A header row and the rows below it. Rows may be shorter than the header.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Position of the first header cell equal to `name`.
    pub fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|h| h == name)
    }

    pub fn require_column(&self, name: &str, source: &str) -> Result<usize> {
        self.column(name)
            .ok_or_else(|| BenchError::input(format!("{source}: missing column '{name}'")))
    }
}

/// Cell `index` of `row`, empty when the row is short.
pub fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(String::as_str).unwrap_or("")
}

/// Returns true for spreadsheet file extensions.
pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

/// Loads a table, choosing the reader from the file extension.
pub fn load_table(path: &Path, format: &FormatConfig, header: HeaderRow) -> Result<Table> {
    let source = path.display().to_string();
    let table = if is_workbook(path) {
        let skip = match header {
            HeaderRow::First => 0,
            HeaderRow::AfterTitles => format.sheet_header_row.saturating_sub(1),
        };
        read_workbook(path, &format.sheet, skip)?
    } else {
        let file = File::open(path)
            .map_err(|e| BenchError::input(format!("Cannot open {source}: {e}")))?;
        let skip = match header {
            HeaderRow::First => 0,
            HeaderRow::AfterTitles => format.skip_rows,
        };
        read_delimited(file, format.delimiter_byte(), skip, &source)?
    };

    debug!(
        "Read {} rows with {} columns from {source}",
        table.rows.len(),
        table.header.len()
    );
    Ok(table)
}

/// Reads delimited text; `source` names the input in error messages.
///
/// Fields are decoded one by one, so a Latin-1 export loads as well as UTF-8.
pub fn read_delimited<R: io::Read>(
    reader: R,
    delimiter: u8,
    skip_rows: usize,
    source: &str,
) -> Result<Table> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(reader);
    let mut records = csv_reader.byte_records().skip(skip_rows);

    let header = records
        .next()
        .ok_or_else(|| BenchError::input(format!("{source} has no header row")))?
        .map_err(|e| BenchError::input(format!("{source}: {e}")))?
        .iter()
        .map(decode_field)
        .collect();

    let mut rows = Vec::new();
    for record in records {
        let record = record.map_err(|e| BenchError::input(format!("{source}: {e}")))?;
        rows.push(record.iter().map(decode_field).collect());
    }

    Ok(Table { header, rows })
}

/// Reads one worksheet, skipping `skip_rows` rows above the header.
///
/// Blank rows below the header are dropped, as blank lines are in
/// delimited files.
pub fn read_workbook(path: &Path, sheet: &str, skip_rows: usize) -> Result<Table> {
    let source = path.display();
    let mut workbook = open_workbook_auto(path)
        .map_err(|e| BenchError::input(format!("Cannot open {source}: {e}")))?;
    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| BenchError::input(format!("{source}: sheet '{sheet}': {e}")))?;

    // The range starts at the first used cell, which need not be in row 1.
    let first_row = range.start().map_or(0, |(row, _)| row as usize);
    let mut rows = range
        .rows()
        .skip(skip_rows.saturating_sub(first_row))
        .map(|row| row.iter().map(cell_text).collect::<Vec<String>>());

    let header = rows
        .next()
        .ok_or_else(|| BenchError::input(format!("{source}: sheet '{sheet}' has no header row")))?;
    let rows = rows
        .filter(|row| row.iter().any(|cell| !cell.is_empty()))
        .collect();

    Ok(Table { header, rows })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(text) => text.trim().to_string(),
        other => other.to_string(),
    }
}

/// Decodes a field as UTF-8, falling back to Latin-1 for older exports.
pub fn decode_field(bytes: &[u8]) -> String {
    let text = match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    };
    text.trim().trim_start_matches('\u{feff}').to_string()
}
