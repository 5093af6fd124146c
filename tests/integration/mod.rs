//! Integration tests for sqlbench.

pub mod analysis_test;
pub mod bench_test;
pub mod postgres_test;
pub mod report_test;
