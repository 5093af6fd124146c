//! AST inspection for the read-only guard.
//!
//! Uses sqlparser-rs with the PostgreSQL dialect. Anything that is not
//! clearly a query is treated as a write.

use sqlparser::ast::{Query, Select, SetExpr, Statement, TableFactor, TableWithJoins};

use super::Verdict;

/// Classifies a single parsed statement.
pub(super) fn classify_statement(statement: &Statement) -> Verdict {
    match statement {
        Statement::Query(query) => match query_write(query) {
            None => Verdict::ReadOnly,
            Some(what) => Verdict::refused(what),
        },
        Statement::Explain {
            analyze, statement, ..
        } => {
            if *analyze {
                // EXPLAIN ANALYZE executes the inner statement
                match classify_statement(statement) {
                    Verdict::ReadOnly => Verdict::ReadOnly,
                    Verdict::Refused(what) => {
                        Verdict::Refused(format!("EXPLAIN ANALYZE of {what}"))
                    }
                }
            } else {
                Verdict::ReadOnly
            }
        }
        Statement::ShowVariable { .. } | Statement::ShowTables { .. } => Verdict::ReadOnly,
        Statement::Insert(_) => Verdict::refused("INSERT"),
        Statement::Update { .. } => Verdict::refused("UPDATE"),
        Statement::Delete(_) => Verdict::refused("DELETE"),
        Statement::Drop { .. } => Verdict::refused("DROP"),
        Statement::Truncate { .. } => Verdict::refused("TRUNCATE"),
        Statement::AlterTable { .. } => Verdict::refused("ALTER TABLE"),
        Statement::CreateTable { .. } => Verdict::refused("CREATE TABLE"),
        Statement::CreateIndex { .. } => Verdict::refused("CREATE INDEX"),
        Statement::CreateView { .. } => Verdict::refused("CREATE VIEW"),
        Statement::Grant { .. } => Verdict::refused("GRANT"),
        Statement::Revoke { .. } => Verdict::refused("REVOKE"),
        _ => Verdict::refused("non-query statement"),
    }
}

/// Names the first write found inside a query, if any.
fn query_write(query: &Query) -> Option<&'static str> {
    let cte_write = query.with.as_ref().and_then(|with| {
        with.cte_tables
            .iter()
            .find_map(|cte| query_write(&cte.query))
    });

    cte_write.or_else(|| set_expr_write(&query.body))
}

fn set_expr_write(set_expr: &SetExpr) -> Option<&'static str> {
    match set_expr {
        SetExpr::Select(select) => select_write(select),
        SetExpr::Query(query) => query_write(query),
        SetExpr::SetOperation { left, right, .. } => {
            set_expr_write(left).or_else(|| set_expr_write(right))
        }
        SetExpr::Values(_) | SetExpr::Table(_) => None,
        // INSERT/UPDATE and friends used as a CTE body
        _ => Some("data-modifying CTE"),
    }
}

fn select_write(select: &Select) -> Option<&'static str> {
    // SELECT ... INTO creates a table
    if select.into.is_some() {
        return Some("SELECT INTO");
    }
    select.from.iter().find_map(table_with_joins_write)
}

fn table_with_joins_write(twj: &TableWithJoins) -> Option<&'static str> {
    table_factor_write(&twj.relation).or_else(|| {
        twj.joins
            .iter()
            .find_map(|join| table_factor_write(&join.relation))
    })
}

fn table_factor_write(factor: &TableFactor) -> Option<&'static str> {
    match factor {
        TableFactor::Derived { subquery, .. } => query_write(subquery),
        TableFactor::NestedJoin {
            table_with_joins, ..
        } => table_with_joins_write(table_with_joins),
        _ => None,
    }
}
