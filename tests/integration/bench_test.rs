//! Benchmark pipeline tests: query file in, results file out, mock database.

use std::time::Duration;

use pretty_assertions::assert_eq;
use sqlbench::bench::{run_pass, BenchmarkRunner, RunOptions};
use sqlbench::config::FormatConfig;
use sqlbench::db::{MockDatabaseClient, MockOutcome, SessionSettings};
use sqlbench::input::load_queries;
use sqlbench::output::BenchmarkWriter;

const QUERIES: &str = "\
NLQ,Q1,Q2,Q3
01 - Number of sensors,SELECT count(*) FROM sensor,,SELECT count(id) FROM sensor
02 - Farms by area,SELECT name FROM farm ORDER BY area,SELECT name FROM farm ORDER BY area DESC LIMIT,
03 - Heavy join,SELECT * FROM reading r JOIN reading s ON true,,
";

fn mock() -> MockDatabaseClient {
    MockDatabaseClient::new()
        .with_latency(Duration::from_millis(100))
        .respond("SELECT count(*) FROM sensor", MockOutcome::single("count", 12))
        .respond("SELECT count(id) FROM sensor", MockOutcome::single("count", 12))
        .respond(
            "SELECT name FROM farm ORDER BY area",
            MockOutcome::single("name", "north"),
        )
        .respond(
            "SELECT name FROM farm ORDER BY area DESC LIMIT",
            MockOutcome::syntax_error("end of input"),
        )
        .respond(
            "SELECT * FROM reading r JOIN reading s ON true",
            MockOutcome::timeout(),
        )
}

fn options(runs: usize) -> RunOptions {
    RunOptions {
        runs,
        cooldown: Duration::from_millis(500),
        session: SessionSettings::default(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_pass_writes_results_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("queries.csv");
    let output = dir.path().join("out").join("results.csv");
    std::fs::write(&input, QUERIES).unwrap();

    let format = FormatConfig::default();
    let nlqs = load_queries(&input, &format).unwrap();
    let db = mock();
    let runner = BenchmarkRunner::new(&db, options(3));
    let mut writer = BenchmarkWriter::create(&output, 3, &format).unwrap();

    let summary = run_pass(&nlqs, &runner, &mut writer, None).await.unwrap();
    drop(writer);

    assert_eq!(summary.variants_run, 5);
    assert_eq!(summary.total_runs, 15);
    assert_eq!(summary.successful_runs, 9);
    assert_eq!(db.open_sessions(), 0);

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(
        written,
        "\
NLQ,Query Number,Execution 1,Execution 2,Execution 3,Successes,Promedio,Desviación
01 - Number of sensors,Q1,0.1,0.1,0.1,3,0.1,0
01 - Number of sensors,Q3,0.1,0.1,0.1,3,0.1,0
02 - Farms by area,Q1,0.1,0.1,0.1,3,0.1,0
02 - Farms by area,Q2,SyntaxError,SyntaxError,SyntaxError,0,N/A,N/A
03 - Heavy join,Q1,Timeout,Timeout,Timeout,0,N/A,N/A
"
    );
}

#[tokio::test(start_paused = true)]
async fn test_locale_output() {
    let format = FormatConfig {
        delimiter: ';',
        decimal_separator: ',',
        skip_rows: 1,
        ..Default::default()
    };
    let text = "Evaluation of generated queries\n\
                NLQ;Q1\n\
                07 - Average temperature;SELECT avg(value) FROM reading\n";
    let nlqs = sqlbench::input::read_queries(text.as_bytes(), &format, "inline").unwrap();
    let db = MockDatabaseClient::new()
        .with_latency(Duration::from_millis(250))
        .respond("SELECT avg(value) FROM reading", MockOutcome::single("avg", 21.5));
    let runner = BenchmarkRunner::new(&db, options(2));
    let mut writer = BenchmarkWriter::new(Vec::new(), 2, &format).unwrap();

    run_pass(&nlqs, &runner, &mut writer, None).await.unwrap();

    let written = String::from_utf8(writer.into_inner().unwrap()).unwrap();
    assert_eq!(
        written.lines().nth(1),
        Some("07 - Average temperature;Q1;0,25;0,25;2;0,25;0")
    );
}

#[tokio::test(start_paused = true)]
async fn test_interrupted_pass_keeps_completed_rows() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.csv");
    let format = FormatConfig::default();
    let nlqs = sqlbench::input::read_queries(QUERIES.as_bytes(), &format, "inline").unwrap();
    let db = mock();
    let runner = BenchmarkRunner::new(&db, options(2));
    let mut writer = BenchmarkWriter::create(&output, 2, &format).unwrap();

    // Each variant takes 2 x (100ms + 500ms); stop partway through the third.
    let pass = run_pass(&nlqs, &runner, &mut writer, None);
    let interrupted = tokio::time::timeout(Duration::from_millis(3_000), pass).await;
    assert!(interrupted.is_err());

    let written = std::fs::read_to_string(&output).unwrap();
    assert_eq!(written.lines().count(), 1 + 2);
    assert!(written.ends_with('\n'));
}
