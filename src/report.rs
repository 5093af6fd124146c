//! Single-shot report across LLM sources.
//!
//! Every variant of every source is executed once and a truncated preview
//! of its result is written next to the SQL, leaving a blank column for
//! manual accuracy review. Each source gets its own sheet of the report
//! workbook, or its own delimited file.

use std::path::{Path, PathBuf};

use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{FormatConfig, ReportConfig, ReportOutput};
use crate::db::{DatabaseClient, QueryResult, SessionSettings, Value};
use crate::error::Result;
use crate::input::{load_queries, Nlq};
use crate::output::{ReportEntry, ReportSink, ReportWorkbook, ReportWriter};

/// Prefix of the result cell of a failed execution.
pub const ERROR_PREFIX: &str = "Error: ";

/// Result cell of a statement that returned no rows.
pub const NO_RESULTS: &str = "Executed query (No results)";

const SEPARATOR: &str = "| ";

/// What happened to one LLM source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSummary {
    pub source: String,
    pub output: PathBuf,
    pub queries_processed: usize,
    pub errors_detected: usize,
}

/// Renders rows as the preview text written into a report.
///
/// Column names, then one line per row, values separated by `"| "`;
/// truncated to `max_chars` characters.
pub fn format_preview(result: &QueryResult, max_chars: usize) -> String {
    if result.columns.is_empty() {
        return truncate(NO_RESULTS, max_chars);
    }

    let header = result
        .columns
        .iter()
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(SEPARATOR);
    let body = result
        .rows
        .iter()
        .map(|row| {
            row.iter()
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(SEPARATOR)
        })
        .collect::<Vec<_>>()
        .join("\n");

    truncate(&format!("{header}\n{body}"), max_chars)
}

/// Renders a failure message as a report cell.
pub fn format_error(message: &str, max_chars: usize) -> String {
    truncate(&format!("{ERROR_PREFIX}{message}"), max_chars)
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Drives the single-shot execution for a list of sources.
pub struct ReportAggregator<'a> {
    db: &'a dyn DatabaseClient,
    config: &'a ReportConfig,
    format: FormatConfig,
    session: SessionSettings,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(
        db: &'a dyn DatabaseClient,
        config: &'a ReportConfig,
        format: FormatConfig,
        session: SessionSettings,
    ) -> Self {
        Self {
            db,
            config,
            format,
            session,
        }
    }

    /// Processes every configured source under `root`.
    ///
    /// Missing directories and unreadable input files are logged and
    /// skipped; only database and output failures abort.
    pub async fn run(&self, root: &Path, output_dir: &Path) -> Result<Vec<SourceSummary>> {
        let started = Instant::now();
        let mut summaries = Vec::new();
        let mut workbook = match self.config.output {
            ReportOutput::Workbook => Some(ReportWorkbook::new(
                output_dir.join(&self.config.workbook_name),
            )),
            ReportOutput::Csv => None,
        };

        for source in &self.config.sources {
            let dir = root.join(source);
            if !dir.is_dir() {
                warn!("Path not found: {}", dir.display());
                continue;
            }

            let input = dir.join(self.config.file_name(source));
            let nlqs = match load_queries(&input, &self.format) {
                Ok(nlqs) => nlqs,
                Err(e) => {
                    error!("Skipping {source}: {e}");
                    continue;
                }
            };

            let summary = match workbook.as_mut() {
                Some(workbook) => {
                    let sheet = workbook.add_sheet(source).to_string();
                    if sheet != *source {
                        warn!("Sheet for {source} is named {sheet}");
                    }
                    let summary = self.process_source(source, &nlqs, workbook).await?;
                    workbook.save()?;
                    SourceSummary {
                        output: workbook.path().to_path_buf(),
                        ..summary
                    }
                }
                None => {
                    let output = output_dir.join(format!("{source}.csv"));
                    let mut writer = ReportWriter::create(&output, &self.format)?;
                    let summary = self.process_source(source, &nlqs, &mut writer).await?;
                    SourceSummary { output, ..summary }
                }
            };
            summaries.push(summary);
        }

        info!(
            "Report finished: {} sources in {:.2}s",
            summaries.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(summaries)
    }

    /// Executes every variant of one source once, writing a row each.
    pub async fn process_source<S: ReportSink>(
        &self,
        source: &str,
        nlqs: &[Nlq],
        sink: &mut S,
    ) -> Result<SourceSummary> {
        info!("Starting process for {source}");
        let mut summary = SourceSummary {
            source: source.to_string(),
            output: PathBuf::new(),
            queries_processed: 0,
            errors_detected: 0,
        };

        for nlq in nlqs {
            for variant in &nlq.variants {
                let started = Instant::now();
                let result = self.execute(&variant.sql).await?;
                debug!(
                    "{source} | NLQ {} | {} | {:.2}s",
                    nlq.id,
                    variant.name(),
                    started.elapsed().as_secs_f64()
                );

                let is_error = result.starts_with(ERROR_PREFIX);
                let entry = ReportEntry {
                    nlq_id: nlq.id.clone(),
                    variant_number: variant.number,
                    sql: variant.sql.clone(),
                    characters_returned: if is_error {
                        0
                    } else {
                        result.chars().count()
                    },
                    result,
                };
                sink.write_entry(&entry)?;

                summary.queries_processed += 1;
                if is_error {
                    summary.errors_detected += 1;
                }

                if !self.config.cooldown().is_zero() {
                    tokio::time::sleep(self.config.cooldown()).await;
                }
            }
        }

        info!(
            "Finished {source}: {} queries processed, {} errors detected",
            summary.queries_processed, summary.errors_detected
        );
        Ok(summary)
    }

    async fn execute(&self, sql: &str) -> Result<String> {
        let mut session = self.db.open_session(&self.session).await?;
        let preview = match session.fetch(sql).await {
            Ok(result) => format_preview(&result, self.config.preview_chars),
            Err(failure) => {
                session.rollback().await;
                format_error(&failure.to_string(), self.config.preview_chars)
            }
        };
        Ok(preview)
    }
}
