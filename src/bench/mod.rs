//! Repeated-run benchmarking of query variants.
//!
//! A pass walks the NLQs in input order and their variants in numeric
//! order. Each variant is run through the [`BenchmarkRunner`], summarised
//! and written out as one row before the next variant starts.

mod classify;
mod runner;
mod stats;

pub use classify::{classify, ErrorCategory, SQLSTATE_QUERY_CANCELED, SQLSTATE_SYNTAX_ERROR};
pub use runner::{BenchmarkRunner, RunOptions};
pub use stats::{mean, nlq_success_rate, QueryStatistics, RunResult};

use std::io;

use tracing::{info, warn};

use crate::error::Result;
use crate::input::Nlq;
use crate::output::BenchmarkWriter;
use crate::safety::{ReadOnlyGuard, Verdict};

/// Totals of one benchmark pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub variants_run: usize,
    /// Variants refused by the read-only guard.
    pub variants_skipped: usize,
    pub total_runs: usize,
    pub successful_runs: usize,
}

impl PassSummary {
    pub fn success_rate(&self) -> f64 {
        if self.total_runs == 0 {
            0.0
        } else {
            self.successful_runs as f64 / self.total_runs as f64
        }
    }
}

/// Benchmarks every variant of every NLQ, writing one row per variant.
///
/// Query failures end up in the rows. Only infrastructure errors (losing
/// the database, failing to write) abort the pass; rows written before
/// that stay on disk.
pub async fn run_pass<W: io::Write>(
    nlqs: &[Nlq],
    runner: &BenchmarkRunner<'_>,
    writer: &mut BenchmarkWriter<W>,
    guard: Option<&ReadOnlyGuard>,
) -> Result<PassSummary> {
    let mut summary = PassSummary::default();
    let total: usize = nlqs.iter().map(|n| n.variants.len()).sum();

    for nlq in nlqs {
        let mut variant_rates = Vec::with_capacity(nlq.variants.len());

        for variant in &nlq.variants {
            if let Some(guard) = guard {
                if let Verdict::Refused(what) = guard.check(&variant.sql) {
                    warn!("Skipping NLQ {} {}: {what}", nlq.id, variant.name());
                    summary.variants_skipped += 1;
                    continue;
                }
            }

            info!(
                "[{}/{total}] NLQ {} {}",
                summary.variants_run + summary.variants_skipped + 1,
                nlq.id,
                variant.name()
            );

            let results = runner.run_query(&variant.sql).await?;
            let stats = QueryStatistics::from_results(&results);
            writer.write_row(&nlq.label, variant.number, &results, &stats)?;

            summary.variants_run += 1;
            summary.total_runs += results.len();
            summary.successful_runs += stats.successes;
            variant_rates.push(stats.success_rate(runner.options().runs));
        }

        if let Some(rate) = nlq_success_rate(&variant_rates) {
            info!("NLQ {} success rate: {:.1}%", nlq.id, rate * 100.0);
        }
    }

    Ok(summary)
}
