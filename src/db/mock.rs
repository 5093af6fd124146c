//! Mock database client for testing.
//!
//! Scripted outcomes per SQL string, a fixed latency per execution, and a log
//! of session events so tests can check that every session was released.

use super::{ColumnInfo, DatabaseClient, DbFailure, QueryResult, Session, SessionSettings, Value};
use crate::error::{BenchError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// What the mock returns for one execution.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Rows(QueryResult),
    Fail(DbFailure),
}

impl MockOutcome {
    /// A single-column, single-row result.
    pub fn single(column: &str, value: impl Into<Value>) -> Self {
        Self::Rows(QueryResult::with_data(
            vec![ColumnInfo::new(column, "text")],
            vec![vec![value.into()]],
        ))
    }

    /// The failure PostgreSQL raises when `statement_timeout` fires.
    pub fn timeout() -> Self {
        Self::Fail(DbFailure::with_code(
            "57014",
            "canceling statement due to statement timeout",
        ))
    }

    /// A syntax error at the given token.
    pub fn syntax_error(near: &str) -> Self {
        Self::Fail(DbFailure::with_code(
            "42601",
            format!("syntax error at or near \"{near}\""),
        ))
    }
}

/// Something that happened to a mock session, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Session opened, state reset and these settings applied.
    Opened(SessionSettings),
    Executed(String),
    RolledBack,
    Released,
}

/// A mock database client that returns scripted results.
#[derive(Debug, Default)]
pub struct MockDatabaseClient {
    latency: Duration,
    scripts: HashMap<String, Vec<MockOutcome>>,
    calls: Mutex<HashMap<String, usize>>,
    events: Mutex<Vec<SessionEvent>>,
    reject_sessions: bool,
}

impl MockDatabaseClient {
    /// Creates a mock that answers instantly and knows no queries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every execution takes `latency` (on the tokio clock).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Always answer `sql` with `outcome`.
    pub fn respond(self, sql: &str, outcome: MockOutcome) -> Self {
        self.script(sql, vec![outcome])
    }

    /// Answer `sql` with `outcomes` in turn, cycling when exhausted.
    pub fn script(mut self, sql: &str, outcomes: Vec<MockOutcome>) -> Self {
        self.scripts.insert(sql.to_string(), outcomes);
        self
    }

    /// Makes every `open_session` fail, as if the server went away.
    pub fn rejecting_sessions(mut self) -> Self {
        self.reject_sessions = true;
        self
    }

    /// Returns a copy of the session event log.
    pub fn events(&self) -> Vec<SessionEvent> {
        lock(&self.events).clone()
    }

    /// Number of sessions opened but not yet released.
    pub fn open_sessions(&self) -> usize {
        let events = lock(&self.events);
        let opened = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Opened(_)))
            .count();
        let released = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::Released))
            .count();
        opened - released
    }

    /// Number of times `sql` was executed.
    pub fn executions(&self, sql: &str) -> usize {
        lock(&self.calls).get(sql).copied().unwrap_or(0)
    }

    fn record(&self, event: SessionEvent) {
        lock(&self.events).push(event);
    }

    fn next_outcome(&self, sql: &str) -> MockOutcome {
        let mut calls = lock(&self.calls);
        let count = calls.entry(sql.to_string()).or_insert(0);
        let index = *count;
        *count += 1;

        match self.scripts.get(sql) {
            Some(outcomes) if !outcomes.is_empty() => outcomes[index % outcomes.len()].clone(),
            _ => MockOutcome::Fail(DbFailure::with_code(
                "42P01",
                format!("relation referenced by \"{sql}\" does not exist"),
            )),
        }
    }

    async fn run(&self, sql: &str) -> std::result::Result<QueryResult, DbFailure> {
        self.record(SessionEvent::Executed(sql.to_string()));
        let outcome = self.next_outcome(sql);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match outcome {
            MockOutcome::Rows(result) => Ok(result),
            MockOutcome::Fail(failure) => Err(failure),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn open_session<'a>(
        &'a self,
        settings: &SessionSettings,
    ) -> Result<Box<dyn Session + 'a>> {
        if self.reject_sessions {
            return Err(BenchError::connection("mock database is unavailable"));
        }
        self.record(SessionEvent::Opened(*settings));
        Ok(Box::new(MockSession { client: self }))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

struct MockSession<'a> {
    client: &'a MockDatabaseClient,
}

#[async_trait]
impl Session for MockSession<'_> {
    async fn execute(&mut self, sql: &str) -> std::result::Result<u64, DbFailure> {
        self.client.run(sql).await.map(|r| r.row_count() as u64)
    }

    async fn fetch(&mut self, sql: &str) -> std::result::Result<QueryResult, DbFailure> {
        self.client.run(sql).await
    }

    async fn rollback(&mut self) {
        self.client.record(SessionEvent::RolledBack);
    }
}

impl Drop for MockSession<'_> {
    fn drop(&mut self) {
        self.client.record(SessionEvent::Released);
    }
}
