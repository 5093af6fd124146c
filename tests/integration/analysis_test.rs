//! Analysis tests: a results file written by the benchmark is read back
//! and turned into chart tables and charts.

use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_xlsxwriter::Workbook;
use sqlbench::analysis::{
    load_results, load_validation, render_charts, write_tables, COMPARISON_CHART,
    DISPERSION_CHART, HEATMAP_CHART, SUCCESS_RATE_CHART, TIMES_CHART,
};
use sqlbench::bench::{run_pass, BenchmarkRunner, RunOptions};
use sqlbench::config::{AnalysisConfig, FormatConfig};
use sqlbench::db::{MockDatabaseClient, MockOutcome, SessionSettings};
use sqlbench::input::read_queries;
use sqlbench::output::BenchmarkWriter;

#[tokio::test(start_paused = true)]
async fn test_bench_output_feeds_analysis() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("results.csv");
    let validation = dir.path().join("validation.csv");
    let tables = dir.path().join("tables");
    let format = FormatConfig {
        delimiter: ';',
        decimal_separator: ',',
        skip_rows: 0,
        ..Default::default()
    };

    let nlqs = read_queries(
        "NLQ;Q1;Q2\n1 - Fast;SELECT 1;SELECT 2\n2 - Broken;SELEC 3;\n".as_bytes(),
        &format,
        "inline",
    )
    .unwrap();
    let db = MockDatabaseClient::new()
        .with_latency(Duration::from_millis(500))
        .respond("SELECT 1", MockOutcome::single("n", 1))
        .script(
            "SELECT 2",
            vec![MockOutcome::single("n", 2), MockOutcome::timeout()],
        )
        .respond("SELEC 3", MockOutcome::syntax_error("SELEC"));
    let runner = BenchmarkRunner::new(
        &db,
        RunOptions {
            runs: 4,
            cooldown: Duration::ZERO,
            session: SessionSettings::default(),
        },
    );
    let mut writer = BenchmarkWriter::create(&results, 4, &format).unwrap();
    run_pass(&nlqs, &runner, &mut writer, None).await.unwrap();
    drop(writer);

    std::fs::write(&validation, "NLQ_ID;Tasa_Exito_Validado\n1;0,5\n2;0\n").unwrap();

    let rows = load_results(&results, &format).unwrap();
    assert_eq!(rows.len(), 3);
    let validation = load_validation(&validation, &format).unwrap();
    let written = write_tables(
        &tables,
        &rows,
        Some(&validation),
        &AnalysisConfig::default(),
        &format,
    )
    .unwrap();
    assert_eq!(written.len(), 6);

    let read = |name: &str| std::fs::read_to_string(tables.join(name)).unwrap();
    assert_eq!(
        read("success_rate_nlq.csv"),
        "NLQ_ID;Success Rate\n1;0,75\n2;0\n"
    );
    assert_eq!(
        read("success_rate_comparison.csv"),
        "NLQ_ID;Execution Success Rate;Validated Success Rate\n1;0,75;0,5\n2;0;0\n"
    );
    assert_eq!(
        read("heatmap_performance.csv"),
        "NLQ_ID;Q1;Q2\n1;0,5;0,5\n2;;\n"
    );
    assert_eq!(
        read("performance_dispersion.csv"),
        "NLQ_ID;Query Number;Promedio;Desviación;Success Rate\n1;Q1;0,5;0;1\n1;Q2;0,5;0;0,5\n"
    );
    // All six times are 0.5, so the 0.95 quantile is 0.5 and nothing is strictly below it.
    assert_eq!(read("times_per_nlq.csv"), "NLQ_ID;Query Number;Run;Time\n");
    assert_eq!(
        read("times_per_nlq_summary.csv"),
        "NLQ_ID;Count;Min;Q1;Median;Q3;Max\n"
    );
}

#[test]
fn test_workbook_results_render_every_chart() {
    let dir = tempfile::tempdir().unwrap();
    let results = dir.path().join("ReferenceQueries.xlsx");
    let validation = dir.path().join("validation.xlsx");
    let charts = dir.path().join("charts");

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    for (col, title) in ["NLQ", "Query", "Execution_1", "Execution_2", "Execution_3"]
        .into_iter()
        .enumerate()
    {
        sheet.write_string(0, col as u16, title).unwrap();
    }
    let runs: [(&str, &str, [f64; 3]); 3] = [
        ("1 - Count sensors", "Q1", [0.1, 0.3, 0.2]),
        ("1 - Count sensors", "Q2", [0.4, 0.5, 0.9]),
        ("2 - Rain per field", "Q1", [1.2, 2.4, 1.8]),
    ];
    for (i, (nlq, query, times)) in runs.iter().enumerate() {
        let row = i as u32 + 1;
        sheet.write_string(row, 0, *nlq).unwrap();
        sheet.write_string(row, 1, *query).unwrap();
        for (j, time) in times.iter().enumerate() {
            sheet.write_number(row, j as u16 + 2, *time).unwrap();
        }
    }
    sheet.write_string(4, 0, "3 - Broken").unwrap();
    sheet.write_string(4, 1, "Q1").unwrap();
    for col in 2..5 {
        sheet.write_string(4, col, "Error de sintaxis").unwrap();
    }
    workbook.save(&results).unwrap();

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "NLQ_ID").unwrap();
    sheet.write_string(0, 1, "Tasa_Exito_Validado").unwrap();
    sheet.write_number(1, 0, 1).unwrap();
    sheet.write_number(1, 1, 0.5).unwrap();
    sheet.write_number(2, 0, 3).unwrap();
    sheet.write_number(2, 1, 0).unwrap();
    workbook.save(&validation).unwrap();

    let format = FormatConfig::default();
    let rows = load_results(&results, &format).unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[1].query_number, "Q2");
    assert_eq!(rows[3].success_rate(), 0.0);
    let validation = load_validation(&validation, &format).unwrap();
    assert_eq!(validation.len(), 2);

    let config = AnalysisConfig {
        outlier_quantile: 1.0,
        ..Default::default()
    };
    let written = render_charts(&charts, &rows, Some(&validation), &config).unwrap();

    for name in [
        SUCCESS_RATE_CHART,
        COMPARISON_CHART,
        HEATMAP_CHART,
        DISPERSION_CHART,
        TIMES_CHART,
    ] {
        let path = charts.join(name);
        assert!(written.contains(&path), "{name} was not rendered");
        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.starts_with("<svg"), "{name} is not an SVG document");
    }
    let times = std::fs::read_to_string(charts.join(TIMES_CHART)).unwrap();
    assert!(times.contains("NLQ 2"));
}
