//! sqlbench - Benchmark LLM-generated SQL against a PostgreSQL database.
//!
//! The binary is a thin wrapper around these modules; integration tests use
//! them directly against the mock or a live database.

pub mod analysis;
pub mod bench;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod input;
pub mod locale;
pub mod logging;
pub mod output;
pub mod report;
pub mod safety;
pub mod sheet;
