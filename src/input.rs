//! Loading of NLQs and their SQL variants from query files.
//!
//! The expected layout is one row per NLQ with a `NLQ` column and variant
//! columns `Q1`..`Q10`. Query files are workbooks (`{llm}-Evaluation.xlsx`)
//! or delimited exports of them. Both usually carry a title row above the
//! header.

use std::io;
use std::path::Path;

use tracing::debug;

use crate::config::FormatConfig;
use crate::error::{BenchError, Result};
use crate::sheet::{self, HeaderRow, Table};

/// Highest variant number read from an input file.
pub const MAX_VARIANTS: u8 = 10;

/// Id given to rows whose NLQ cell is blank but that still carry queries.
const UNKNOWN_NLQ: &str = "Unknown";

/// One candidate SQL translation of an NLQ.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryVariant {
    /// Variant number, `n` in `Qn`.
    pub number: u8,
    pub sql: String,
}

impl QueryVariant {
    /// `Q1`, `Q2`, ...
    pub fn name(&self) -> String {
        format!("Q{}", self.number)
    }
}

/// A natural-language question and its SQL variants, in variant order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Nlq {
    /// The text before the first `" - "` of the label.
    pub id: String,
    /// The full NLQ cell, e.g. `07 - Average temperature per field`.
    pub label: String,
    pub variants: Vec<QueryVariant>,
}

/// Extracts the NLQ id from a label like `07 - Average temperature`.
pub fn nlq_id(label: &str) -> String {
    let label = label.trim();
    if label.is_empty() {
        return UNKNOWN_NLQ.to_string();
    }
    label
        .split(" - ")
        .next()
        .map(str::trim)
        .unwrap_or(label)
        .to_string()
}

/// Loads NLQs from a workbook or a delimited file.
pub fn load_queries(path: &Path, format: &FormatConfig) -> Result<Vec<Nlq>> {
    let table = sheet::load_table(path, format, HeaderRow::AfterTitles)?;
    queries_from_table(&table, &path.display().to_string())
}

/// Reads NLQs from delimited text; `source` names it in error messages.
pub fn read_queries<R: io::Read>(
    reader: R,
    format: &FormatConfig,
    source: &str,
) -> Result<Vec<Nlq>> {
    let table = sheet::read_delimited(reader, format.delimiter_byte(), format.skip_rows, source)?;
    queries_from_table(&table, source)
}

fn queries_from_table(table: &Table, source: &str) -> Result<Vec<Nlq>> {
    let layout = Layout::from_header(&table.header, source)?;
    let nlqs: Vec<Nlq> = table
        .rows
        .iter()
        .filter_map(|row| layout.parse_row(row))
        .collect();

    debug!(
        "Loaded {} NLQs with {} variants from {source}",
        nlqs.len(),
        nlqs.iter().map(|n| n.variants.len()).sum::<usize>()
    );
    Ok(nlqs)
}

/// Column positions found in the header row.
struct Layout {
    nlq: usize,
    variants: Vec<(u8, usize)>,
}

impl Layout {
    fn from_header(header: &[String], source: &str) -> Result<Self> {
        let mut nlq = None;
        let mut variants = Vec::new();

        for (index, name) in header.iter().enumerate() {
            if name == "NLQ" {
                nlq = Some(index);
            } else if let Some(number) = variant_number(name) {
                variants.push((number, index));
            }
        }

        let nlq =
            nlq.ok_or_else(|| BenchError::input(format!("{source}: missing column 'NLQ'")))?;
        if variants.is_empty() {
            return Err(BenchError::input(format!(
                "{source}: no query columns (Q1..Q{MAX_VARIANTS})"
            )));
        }
        variants.sort_unstable();

        Ok(Self { nlq, variants })
    }

    fn parse_row(&self, row: &[String]) -> Option<Nlq> {
        let label = sheet::cell(row, self.nlq).to_string();

        let variants: Vec<QueryVariant> = self
            .variants
            .iter()
            .filter_map(|&(number, index)| {
                let sql = sheet::cell(row, index);
                (!sql.is_empty()).then(|| QueryVariant {
                    number,
                    sql: sql.to_string(),
                })
            })
            .collect();

        if label.is_empty() && variants.is_empty() {
            return None;
        }

        Some(Nlq {
            id: nlq_id(&label),
            label,
            variants,
        })
    }
}

fn variant_number(column: &str) -> Option<u8> {
    let number: u8 = column.strip_prefix('Q')?.parse().ok()?;
    (1..=MAX_VARIANTS).contains(&number).then_some(number)
}
