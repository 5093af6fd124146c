//! Report tests: LLM source directories in, one sheet per source out.

use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use rust_xlsxwriter::Workbook;
use sqlbench::config::{FormatConfig, ReportConfig, ReportOutput};
use sqlbench::db::{MockDatabaseClient, MockOutcome, SessionSettings};
use sqlbench::report::ReportAggregator;

fn write_source(root: &Path, llm: &str, body: &str) {
    let dir = root.join(llm);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join(format!("{llm}-Evaluation.csv")), body).unwrap();
}

/// Writes `{llm}-Evaluation.xlsx` with a title row above the header.
fn write_workbook_source(root: &Path, llm: &str, rows: &[[&str; 2]]) {
    let dir = root.join(llm);
    std::fs::create_dir_all(&dir).unwrap();
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, &format!("{llm} evaluation")).unwrap();
    sheet.write_string(1, 0, "NLQ").unwrap();
    sheet.write_string(1, 1, "Q1").unwrap();
    for (i, [nlq, sql]) in rows.iter().enumerate() {
        sheet.write_string(i as u32 + 2, 0, *nlq).unwrap();
        sheet.write_string(i as u32 + 2, 1, *sql).unwrap();
    }
    workbook.save(dir.join(format!("{llm}-Evaluation.xlsx"))).unwrap();
}

fn read_sheet(path: &Path) -> Vec<Vec<String>> {
    let mut reader = csv::Reader::from_path(path).unwrap();
    reader
        .records()
        .map(|r| r.unwrap().iter().map(String::from).collect())
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_report_over_two_sources() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_source(
        root.path(),
        "GPT-4o",
        "NLQ,Q1,Q2\n1 - Count sensors,SELECT count(*) FROM sensor,SELECT nothing FROM sensor\n",
    );
    write_source(
        root.path(),
        "DeepSeek",
        "NLQ,Q1\n1 - Count sensors,SELECT count(*) FROM sensor\n2 - Empty,SELECT 1 WHERE false\n",
    );

    let db = MockDatabaseClient::new()
        .respond("SELECT count(*) FROM sensor", MockOutcome::single("count", 12))
        .respond(
            "SELECT 1 WHERE false",
            MockOutcome::Rows(Default::default()),
        );
    let config = ReportConfig {
        sources: vec!["DeepSeek".to_string(), "GPT-4o".to_string()],
        file_pattern: "{llm}-Evaluation.csv".to_string(),
        output: ReportOutput::Csv,
        ..Default::default()
    };
    let aggregator = ReportAggregator::new(
        &db,
        &config,
        FormatConfig::default(),
        SessionSettings::default(),
    );

    let summaries = aggregator.run(root.path(), out.path()).await.unwrap();

    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[0].source, "DeepSeek");
    assert_eq!(summaries[0].queries_processed, 2);
    assert_eq!(summaries[0].errors_detected, 0);
    assert_eq!(summaries[1].errors_detected, 1);
    assert_eq!(db.open_sessions(), 0);

    let deepseek = read_sheet(&out.path().join("DeepSeek.csv"));
    assert_eq!(
        deepseek,
        vec![
            vec!["1", "Q1", "SELECT count(*) FROM sensor", "count\n12", "8", ""],
            vec![
                "2",
                "Q1",
                "SELECT 1 WHERE false",
                "Executed query (No results)",
                "27",
                ""
            ],
        ]
    );

    let gpt = read_sheet(&out.path().join("GPT-4o.csv"));
    assert_eq!(gpt.len(), 2);
    assert!(gpt[1][3].starts_with("Error: "));
    assert!(gpt[1][3].contains("42P01"));
    assert_eq!(gpt[1][4], "0");
}

#[tokio::test(start_paused = true)]
async fn test_report_workbook_from_workbook_inputs() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    write_workbook_source(
        root.path(),
        "Claude-3.5-Sonnet",
        &[["1 - Count sensors", "SELECT count(*) FROM sensor"]],
    );
    write_workbook_source(
        root.path(),
        "Meta-Llama-3.1-405B-Instruct-Turbo",
        &[
            ["1 - Count sensors", "SELECT count(*) FROM sensor"],
            ["2 - Empty", "SELECT 1 WHERE false"],
        ],
    );

    let db = MockDatabaseClient::new()
        .respond("SELECT count(*) FROM sensor", MockOutcome::single("count", 12))
        .respond(
            "SELECT 1 WHERE false",
            MockOutcome::Rows(Default::default()),
        );
    let config = ReportConfig {
        sources: vec![
            "Claude-3.5-Sonnet".to_string(),
            "Meta-Llama-3.1-405B-Instruct-Turbo".to_string(),
        ],
        cooldown_ms: 0,
        ..Default::default()
    };
    let aggregator = ReportAggregator::new(
        &db,
        &config,
        FormatConfig::default(),
        SessionSettings::default(),
    );

    let summaries = aggregator.run(root.path(), out.path()).await.unwrap();

    let path = out.path().join("LLM_Validation_Report.xlsx");
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries[1].output, path);
    assert_eq!(summaries[1].queries_processed, 2);

    let mut book = open_workbook_auto(&path).unwrap();
    assert_eq!(
        book.sheet_names(),
        vec!["Claude-3.5-Sonnet", "Meta-Llama-3.1-405B-Instruct-Tu"]
    );
    let llama = book
        .worksheet_range("Meta-Llama-3.1-405B-Instruct-Tu")
        .unwrap();
    assert_eq!(llama.get_size(), (3, 6));
    assert_eq!(
        llama.get((1, 3)),
        Some(&Data::String("count\n12".to_string()))
    );
    assert_eq!(
        llama.get((2, 3)),
        Some(&Data::String("Executed query (No results)".to_string()))
    );
    assert_eq!(llama.get((2, 4)), Some(&Data::Float(27.0)));
}

#[tokio::test(start_paused = true)]
async fn test_report_with_no_sources_present() {
    let root = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    let db = MockDatabaseClient::new();
    let config = ReportConfig::default();
    let aggregator = ReportAggregator::new(
        &db,
        &config,
        FormatConfig::default(),
        SessionSettings::default(),
    );

    let summaries = aggregator.run(root.path(), out.path()).await.unwrap();

    assert!(summaries.is_empty());
    assert!(db.events().is_empty());
    assert!(!out.path().join("LLM_Validation_Report.xlsx").exists());
}
