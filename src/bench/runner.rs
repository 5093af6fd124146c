//! Repeated execution of one query under controlled conditions.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use super::{classify, RunResult};
use crate::config::BenchmarkConfig;
use crate::db::{DatabaseClient, SessionSettings};
use crate::error::Result;

/// Longest error message excerpt written to the log.
const LOG_MESSAGE_CHARS: usize = 200;

/// How many times to run each query and how to pace the runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunOptions {
    pub runs: usize,
    pub cooldown: Duration,
    pub session: SessionSettings,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&BenchmarkConfig::default())
    }
}

impl RunOptions {
    pub fn from_config(config: &BenchmarkConfig) -> Self {
        Self {
            runs: config.runs,
            cooldown: config.cooldown(),
            session: SessionSettings::from_config(config),
        }
    }
}

/// Executes queries one run at a time, each in a fresh scoped session.
pub struct BenchmarkRunner<'a> {
    db: &'a dyn DatabaseClient,
    options: RunOptions,
}

impl<'a> BenchmarkRunner<'a> {
    pub fn new(db: &'a dyn DatabaseClient, options: RunOptions) -> Self {
        Self { db, options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Runs `sql` the configured number of times.
    ///
    /// A failing run is recorded and the next run starts anyway; only a
    /// failure to open a session aborts.
    pub async fn run_query(&self, sql: &str) -> Result<Vec<RunResult>> {
        let mut results = Vec::with_capacity(self.options.runs);

        for run in 1..=self.options.runs {
            let result = self.run_once(sql).await?;
            debug!(run, %result, "run finished");
            results.push(result);

            if !self.options.cooldown.is_zero() {
                tokio::time::sleep(self.options.cooldown).await;
            }
        }

        Ok(results)
    }

    async fn run_once(&self, sql: &str) -> Result<RunResult> {
        let mut session = self.db.open_session(&self.options.session).await?;

        let start = Instant::now();
        let outcome = session.execute(sql).await;
        let elapsed = start.elapsed();

        let result = match outcome {
            Ok(_) => RunResult::elapsed(elapsed.as_secs_f64()),
            Err(failure) => {
                session.rollback().await;
                let category = classify(&failure);
                let message: String = failure.message.chars().take(LOG_MESSAGE_CHARS).collect();
                warn!("{category} in query: {message}");
                RunResult::Failed(category)
            }
        };

        // Released here on both paths.
        drop(session);
        Ok(result)
    }
}
