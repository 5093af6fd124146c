//! Maps database failures to the categories recorded in benchmark output.

use crate::db::DbFailure;
use std::fmt;

/// SQLSTATE raised when `statement_timeout` cancels a statement.
pub const SQLSTATE_QUERY_CANCELED: &str = "57014";

/// SQLSTATE for malformed SQL.
pub const SQLSTATE_SYNTAX_ERROR: &str = "42601";

/// Why a run did not produce a timing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The statement exceeded the configured timeout.
    Timeout,
    /// The SQL could not be parsed by the server.
    SyntaxError,
    /// Anything else: missing relations, type mismatches, permissions, lost connections.
    GenericExecutionError,
}

impl ErrorCategory {
    /// The label written into result files.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Timeout => "Timeout",
            Self::SyntaxError => "SyntaxError",
            Self::GenericExecutionError => "GenericExecutionError",
        }
    }

    /// Parses a label read back from a result file.
    ///
    /// Also accepts the Spanish labels found in older result files.
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim() {
            "Timeout" => Some(Self::Timeout),
            "SyntaxError" | "Error de sintaxis" => Some(Self::SyntaxError),
            "GenericExecutionError" | "Error en ejecución" | "Error SQL" => {
                Some(Self::GenericExecutionError)
            }
            _ => None,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Classifies a failed execution by its SQLSTATE.
pub fn classify(failure: &DbFailure) -> ErrorCategory {
    match failure.code.as_deref() {
        Some(SQLSTATE_QUERY_CANCELED) => ErrorCategory::Timeout,
        Some(SQLSTATE_SYNTAX_ERROR) => ErrorCategory::SyntaxError,
        _ => ErrorCategory::GenericExecutionError,
    }
}
