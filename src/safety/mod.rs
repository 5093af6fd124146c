//! Read-only guard for benchmarked SQL.
//!
//! Generated SQL is meant to answer questions, not change data. With
//! `enforce_read_only` set, anything that would modify the database is
//! skipped instead of executed. SQL that does not parse is let through so
//! the server reports the syntax error like any other failed run.

mod parser;

use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use std::fmt;

/// Outcome of inspecting one SQL string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    ReadOnly,
    /// The statement would write; carries what was found.
    Refused(String),
}

impl Verdict {
    fn refused(what: &str) -> Self {
        Self::Refused(what.to_string())
    }

    pub fn is_read_only(&self) -> bool {
        matches!(self, Self::ReadOnly)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "read-only"),
            Self::Refused(what) => write!(f, "refused: {what}"),
        }
    }
}

/// Parses SQL and decides whether it may be benchmarked.
#[derive(Debug)]
pub struct ReadOnlyGuard {
    dialect: PostgreSqlDialect,
}

impl Default for ReadOnlyGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadOnlyGuard {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Inspects every statement in `sql`; one writing statement refuses the whole string.
    pub fn check(&self, sql: &str) -> Verdict {
        let statements = match Parser::parse_sql(&self.dialect, sql) {
            Ok(statements) => statements,
            Err(_) => return Verdict::ReadOnly,
        };

        statements
            .iter()
            .map(parser::classify_statement)
            .find(|v| !v.is_read_only())
            .unwrap_or(Verdict::ReadOnly)
    }
}

/// Convenience wrapper around [`ReadOnlyGuard::check`].
pub fn is_read_only(sql: &str) -> bool {
    ReadOnlyGuard::new().check(sql).is_read_only()
}
