//! PostgreSQL session tests.
//!
//! These need a running server; set DATABASE_URL to run them.

use std::time::Duration;

use sqlbench::bench::{BenchmarkRunner, ErrorCategory, RunOptions, RunResult};
use sqlbench::config::ConnectionConfig;
use sqlbench::db::{DatabaseClient, PostgresClient, Session, SessionSettings, Value};
use sqlbench::report::{format_preview, NO_RESULTS};

fn get_test_config() -> Option<ConnectionConfig> {
    let url = std::env::var("DATABASE_URL").ok()?;
    ConnectionConfig::from_connection_string(&url).ok()
}

async fn get_pooled_client() -> Option<PostgresClient> {
    PostgresClient::connect_pooled(&get_test_config()?, 3)
        .await
        .ok()
}

async fn get_shared_client() -> Option<PostgresClient> {
    PostgresClient::connect_shared(&get_test_config()?).await.ok()
}

fn short_timeout() -> SessionSettings {
    SessionSettings {
        statement_timeout: Duration::from_millis(100),
        lock_timeout: Duration::from_millis(100),
    }
}

#[tokio::test]
async fn test_fetch_simple_select() {
    let Some(client) = get_pooled_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let mut session = client
        .open_session(&SessionSettings::default())
        .await
        .unwrap();
    let result = session
        .fetch("SELECT 1 AS num, 'hello' AS greeting")
        .await
        .unwrap();
    drop(session);

    assert_eq!(result.columns.len(), 2);
    assert_eq!(result.columns[0].name, "num");
    assert_eq!(
        result.rows,
        vec![vec![Value::Int(1), Value::String("hello".into())]]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_select_without_rows_keeps_its_header() {
    let Some(client) = get_pooled_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let mut session = client
        .open_session(&SessionSettings::default())
        .await
        .unwrap();
    let empty = session.fetch("SELECT 1 AS id WHERE false").await.unwrap();
    let no_result_set = session.fetch("SET search_path TO public").await.unwrap();
    drop(session);

    assert!(empty.rows.is_empty());
    assert_eq!(format_preview(&empty, 2000), "id\n");
    assert!(no_result_set.columns.is_empty());
    assert_eq!(format_preview(&no_result_set, 2000), NO_RESULTS);

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_session_settings_are_applied() {
    let Some(client) = get_pooled_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };

    let mut session = client.open_session(&short_timeout()).await.unwrap();
    let result = session.fetch("SHOW statement_timeout").await.unwrap();
    drop(session);

    assert_eq!(result.rows[0][0], Value::String("100ms".into()));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_session_state_is_discarded() {
    let Some(client) = get_shared_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let settings = SessionSettings::default();

    {
        let mut session = client.open_session(&settings).await.unwrap();
        session
            .execute("CREATE TEMP TABLE sqlbench_scratch (id int)")
            .await
            .unwrap();
    }

    let mut session = client.open_session(&settings).await.unwrap();
    let failure = session
        .execute("SELECT * FROM sqlbench_scratch")
        .await
        .unwrap_err();
    drop(session);

    assert_eq!(failure.code.as_deref(), Some("42P01"));
    client.close().await.unwrap();
}

#[tokio::test]
async fn test_runner_classifies_server_errors() {
    let Some(client) = get_pooled_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let runner = BenchmarkRunner::new(
        &client,
        RunOptions {
            runs: 2,
            cooldown: Duration::ZERO,
            session: short_timeout(),
        },
    );

    let ok = runner.run_query("SELECT 1").await.unwrap();
    assert!(ok.iter().all(RunResult::is_success));

    let syntax = runner.run_query("SELEC 1").await.unwrap();
    assert_eq!(syntax, vec![RunResult::Failed(ErrorCategory::SyntaxError); 2]);

    let timeout = runner.run_query("SELECT pg_sleep(5)").await.unwrap();
    assert_eq!(timeout, vec![RunResult::Failed(ErrorCategory::Timeout); 2]);

    let missing = runner
        .run_query("SELECT * FROM sqlbench_missing_table")
        .await
        .unwrap();
    assert_eq!(
        missing,
        vec![RunResult::Failed(ErrorCategory::GenericExecutionError); 2]
    );

    client.close().await.unwrap();
}

#[tokio::test]
async fn test_shared_connection_survives_failures() {
    let Some(client) = get_shared_client().await else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let runner = BenchmarkRunner::new(
        &client,
        RunOptions {
            runs: 1,
            cooldown: Duration::ZERO,
            session: short_timeout(),
        },
    );

    runner.run_query("SELECT pg_sleep(5)").await.unwrap();
    let after = runner.run_query("SELECT 1").await.unwrap();
    assert!(after[0].is_success());

    client.close().await.unwrap();
}
