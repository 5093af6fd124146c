//! The tables behind each chart, and writing them out.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::{Path, PathBuf};

use tracing::info;

use super::BenchmarkRow;
use crate::bench::mean;
use crate::config::{AnalysisConfig, FormatConfig};
use crate::error::{BenchError, Result};
use crate::locale::NumberFormat;

pub const SUCCESS_RATE_FILE: &str = "success_rate_nlq.csv";
pub const COMPARISON_FILE: &str = "success_rate_comparison.csv";
pub const HEATMAP_FILE: &str = "heatmap_performance.csv";
pub const DISPERSION_FILE: &str = "performance_dispersion.csv";
pub const TIMES_FILE: &str = "times_per_nlq.csv";
pub const TIME_SUMMARY_FILE: &str = "times_per_nlq_summary.csv";

/// Execution and validated success rate of one NLQ.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateComparison {
    pub nlq_id: u32,
    pub execution_rate: f64,
    pub validated_rate: f64,
}

/// Mean time per NLQ (rows) and query number (columns).
#[derive(Debug, Clone, PartialEq)]
pub struct Heatmap {
    pub columns: Vec<String>,
    pub rows: Vec<(u32, Vec<Option<f64>>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispersionPoint {
    pub nlq_id: u32,
    pub query_number: String,
    pub mean: f64,
    pub std_dev: f64,
    pub success_rate: f64,
}

/// One timed run kept for the distribution charts.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeSample {
    pub nlq_id: u32,
    pub query_number: String,
    pub run: usize,
    pub time: f64,
}

/// Box-plot five-number summary of one NLQ's times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSummary {
    pub nlq_id: u32,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Quantile of sorted values with linear interpolation between closest ranks.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let position = (sorted.len() - 1) as f64 * q;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Mean row success rate per NLQ, ordered by id.
pub fn success_rate_by_nlq(rows: &[BenchmarkRow]) -> Vec<(u32, f64)> {
    let mut rates: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for row in rows {
        rates.entry(row.nlq_id).or_default().push(row.success_rate());
    }
    rates
        .into_iter()
        .filter_map(|(id, rates)| mean(&rates).map(|rate| (id, rate)))
        .collect()
}

/// NLQs present in both the results and the validation table.
pub fn success_rate_comparison(
    rows: &[BenchmarkRow],
    validation: &BTreeMap<u32, f64>,
) -> Vec<RateComparison> {
    success_rate_by_nlq(rows)
        .into_iter()
        .filter_map(|(nlq_id, execution_rate)| {
            validation.get(&nlq_id).map(|&validated_rate| RateComparison {
                nlq_id,
                execution_rate,
                validated_rate,
            })
        })
        .collect()
}

pub fn heatmap(rows: &[BenchmarkRow]) -> Heatmap {
    let mut columns: Vec<(Option<u8>, String)> = Vec::new();
    for row in rows {
        let key = (row.variant_number(), row.query_number.clone());
        if !columns.contains(&key) {
            columns.push(key);
        }
    }
    columns.sort();
    let columns: Vec<String> = columns.into_iter().map(|(_, name)| name).collect();

    let mut cells: BTreeMap<u32, BTreeMap<&str, Vec<f64>>> = BTreeMap::new();
    for row in rows {
        let by_query = cells.entry(row.nlq_id).or_default();
        let values = by_query.entry(row.query_number.as_str()).or_default();
        if let Some(m) = row.mean {
            values.push(m);
        }
    }

    let rows = cells
        .into_iter()
        .map(|(id, by_query)| {
            let values = columns
                .iter()
                .map(|c| by_query.get(c.as_str()).and_then(|v| mean(v)))
                .collect();
            (id, values)
        })
        .collect();

    Heatmap { columns, rows }
}

/// Variants with both a mean and a standard deviation.
pub fn dispersion(rows: &[BenchmarkRow]) -> Vec<DispersionPoint> {
    rows.iter()
        .filter_map(|row| {
            Some(DispersionPoint {
                nlq_id: row.nlq_id,
                query_number: row.query_number.clone(),
                mean: row.mean?,
                std_dev: row.std_dev?,
                success_rate: row.success_rate(),
            })
        })
        .collect()
}

/// Timed runs strictly between `min_time_secs` and the outlier quantile of all times.
pub fn filtered_times(rows: &[BenchmarkRow], config: &AnalysisConfig) -> Vec<TimeSample> {
    let mut all: Vec<f64> = rows.iter().flat_map(|r| r.times().map(|(_, t)| t)).collect();
    all.sort_by(f64::total_cmp);
    let Some(ceiling) = quantile(&all, config.outlier_quantile) else {
        return Vec::new();
    };

    let mut samples: Vec<TimeSample> = rows
        .iter()
        .flat_map(|row| {
            row.times().map(move |(run, time)| TimeSample {
                nlq_id: row.nlq_id,
                query_number: row.query_number.clone(),
                run,
                time,
            })
        })
        .filter(|s| s.time > config.min_time_secs && s.time < ceiling)
        .collect();
    samples.sort_by_key(|s| s.nlq_id);
    samples
}

pub fn time_summaries(samples: &[TimeSample]) -> Vec<TimeSummary> {
    let mut by_nlq: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for sample in samples {
        by_nlq.entry(sample.nlq_id).or_default().push(sample.time);
    }

    by_nlq
        .into_iter()
        .filter_map(|(nlq_id, mut times)| {
            times.sort_by(f64::total_cmp);
            Some(TimeSummary {
                nlq_id,
                count: times.len(),
                min: *times.first()?,
                q1: quantile(&times, 0.25)?,
                median: quantile(&times, 0.5)?,
                q3: quantile(&times, 0.75)?,
                max: *times.last()?,
            })
        })
        .collect()
}

/// Writes every table into `output_dir` and returns the files written.
///
/// The comparison table is only written when a validation table is given.
pub fn write_tables(
    output_dir: &Path,
    rows: &[BenchmarkRow],
    validation: Option<&BTreeMap<u32, f64>>,
    config: &AnalysisConfig,
    format: &FormatConfig,
) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(output_dir).map_err(|e| {
        BenchError::output(format!("Cannot create {}: {e}", output_dir.display()))
    })?;
    let table = TableWriter {
        dir: output_dir,
        format,
        numbers: NumberFormat::new(format.decimal_separator),
    };
    let n = |v: f64| table.numbers.format(v);
    let mut written = Vec::new();

    written.push(table.write(
        SUCCESS_RATE_FILE,
        &["NLQ_ID", "Success Rate"],
        success_rate_by_nlq(rows)
            .into_iter()
            .map(|(id, rate)| vec![id.to_string(), n(rate)]),
    )?);

    if let Some(validation) = validation {
        written.push(table.write(
            COMPARISON_FILE,
            &["NLQ_ID", "Execution Success Rate", "Validated Success Rate"],
            success_rate_comparison(rows, validation).into_iter().map(|c| {
                vec![
                    c.nlq_id.to_string(),
                    n(c.execution_rate),
                    n(c.validated_rate),
                ]
            }),
        )?);
    }

    let map = heatmap(rows);
    let mut header = vec!["NLQ_ID"];
    header.extend(map.columns.iter().map(String::as_str));
    written.push(table.write(
        HEATMAP_FILE,
        &header,
        map.rows.iter().map(|(id, values)| {
            let mut record = vec![id.to_string()];
            record.extend(values.iter().map(|v| v.map(n).unwrap_or_default()));
            record
        }),
    )?);

    written.push(table.write(
        DISPERSION_FILE,
        &["NLQ_ID", "Query Number", "Promedio", "Desviación", "Success Rate"],
        dispersion(rows).into_iter().map(|p| {
            vec![
                p.nlq_id.to_string(),
                p.query_number,
                n(p.mean),
                n(p.std_dev),
                n(p.success_rate),
            ]
        }),
    )?);

    let samples = filtered_times(rows, config);
    written.push(table.write(
        TIMES_FILE,
        &["NLQ_ID", "Query Number", "Run", "Time"],
        samples.iter().map(|s| {
            vec![
                s.nlq_id.to_string(),
                s.query_number.clone(),
                s.run.to_string(),
                n(s.time),
            ]
        }),
    )?);

    written.push(table.write(
        TIME_SUMMARY_FILE,
        &["NLQ_ID", "Count", "Min", "Q1", "Median", "Q3", "Max"],
        time_summaries(&samples).into_iter().map(|s| {
            vec![
                s.nlq_id.to_string(),
                s.count.to_string(),
                n(s.min),
                n(s.q1),
                n(s.median),
                n(s.q3),
                n(s.max),
            ]
        }),
    )?);

    info!(
        "Wrote {} analysis tables to {}",
        written.len(),
        output_dir.display()
    );
    Ok(written)
}

struct TableWriter<'a> {
    dir: &'a Path,
    format: &'a FormatConfig,
    numbers: NumberFormat,
}

impl TableWriter<'_> {
    fn write<I>(&self, name: &str, header: &[&str], records: I) -> Result<PathBuf>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let path = self.dir.join(name);
        let file = File::create(&path)
            .map_err(|e| BenchError::output(format!("Cannot create {}: {e}", path.display())))?;
        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.format.delimiter_byte())
            .from_writer(file);

        let fail = |e: csv::Error| BenchError::output(format!("{}: {e}", path.display()));
        writer.write_record(header).map_err(fail)?;
        for record in records {
            writer.write_record(&record).map_err(fail)?;
        }
        writer
            .flush()
            .map_err(|e| BenchError::output(format!("{}: {e}", path.display())))?;
        Ok(path)
    }
}
