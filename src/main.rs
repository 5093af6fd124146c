//! sqlbench - Benchmark LLM-generated SQL against a PostgreSQL database.

use sqlbench::analysis::{
    load_results, load_validation, load_ves, render_charts, render_ves_chart, write_tables,
};
use sqlbench::bench::{run_pass, BenchmarkRunner, RunOptions};
use sqlbench::cli::{AnalyzeArgs, BenchArgs, Cli, Command, ReportArgs, VesArgs};
use sqlbench::config::{Config, ConnectionConfig};
use sqlbench::db::{self, DatabaseClient, SessionSettings};
use sqlbench::error::{BenchError, Result};
use sqlbench::input::load_queries;
use sqlbench::logging::init_logging;
use sqlbench::output::BenchmarkWriter;
use sqlbench::report::ReportAggregator;
use sqlbench::safety::ReadOnlyGuard;
use tracing::{error, info};

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse_args();
    init_logging(cli.log_file.as_ref().map(|p| p.as_deref()));

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load_from_file(&config_path)?;

    match &cli.command {
        Command::Bench(args) => bench(&cli, args, &mut config).await,
        Command::Report(args) => report(&cli, args, &mut config).await,
        Command::Analyze(args) => analyze(args, &mut config),
        Command::Ves(args) => ves(args, &config),
    }
}

async fn bench(cli: &Cli, args: &BenchArgs, config: &mut Config) -> Result<()> {
    args.apply(&mut config.benchmark);
    config.validate()?;
    let settings = &config.benchmark;

    let nlqs = load_queries(&args.input, &config.format)?;
    info!(
        "Loaded {} NLQs from {}; {} runs per variant",
        nlqs.len(),
        args.input.display(),
        settings.runs
    );

    let db = connect(cli, config).await?;
    let runner = BenchmarkRunner::new(db.as_ref(), RunOptions::from_config(settings));
    let mut writer = BenchmarkWriter::create(&args.output, settings.runs, &config.format)?;
    let guard = settings.enforce_read_only.then(ReadOnlyGuard::new);

    let outcome = run_pass(&nlqs, &runner, &mut writer, guard.as_ref()).await;
    let closed = db.close().await;
    let summary = outcome?;
    closed?;

    info!(
        "Benchmark finished: {} variants ({} skipped), {}/{} successful runs ({:.1}%), results in {}",
        summary.variants_run,
        summary.variants_skipped,
        summary.successful_runs,
        summary.total_runs,
        summary.success_rate() * 100.0,
        args.output.display()
    );
    Ok(())
}

async fn report(cli: &Cli, args: &ReportArgs, config: &mut Config) -> Result<()> {
    args.apply(&mut config.report);
    config.validate()?;

    let db = connect(cli, config).await?;
    let aggregator = ReportAggregator::new(
        db.as_ref(),
        &config.report,
        config.format.clone(),
        SessionSettings::from_config(&config.benchmark),
    );

    let outcome = aggregator.run(&args.root, &args.output_dir).await;
    let closed = db.close().await;
    let summaries = outcome?;
    closed?;

    for summary in &summaries {
        info!(
            "{}: {} queries, {} errors -> {}",
            summary.source,
            summary.queries_processed,
            summary.errors_detected,
            summary.output.display()
        );
    }
    Ok(())
}

fn analyze(args: &AnalyzeArgs, config: &mut Config) -> Result<()> {
    args.apply(&mut config.analysis);
    config.validate()?;

    let rows = load_results(&args.input, &config.format)?;
    let validation = args
        .validation
        .as_deref()
        .map(|path| load_validation(path, &config.format))
        .transpose()?;

    write_tables(
        &args.output_dir,
        &rows,
        validation.as_ref(),
        &config.analysis,
        &config.format,
    )?;
    if config.analysis.charts {
        render_charts(
            &args.output_dir,
            &rows,
            validation.as_ref(),
            &config.analysis,
        )?;
    }
    Ok(())
}

fn ves(args: &VesArgs, config: &Config) -> Result<()> {
    config.validate()?;
    let table = load_ves(&args.input, &config.format)?;
    info!(
        "Loaded VES scores of {} models over {} NLQs from {}",
        table.models.len(),
        table.rows.len(),
        args.input.display()
    );
    render_ves_chart(&args.output_dir, &table)?;
    Ok(())
}

async fn connect(cli: &Cli, config: &Config) -> Result<Box<dyn DatabaseClient>> {
    let connection = resolve_connection(cli, config)?.ok_or_else(|| {
        BenchError::config(
            "No database connection configured. Pass a connection string, \
             -H/-d/-U, -c NAME, or set PGHOST/PGDATABASE.",
        )
    })?;
    info!("Connection: {}", connection.display_string());

    db::connect(
        &connection,
        config.benchmark.connection_mode,
        config.benchmark.pool_size,
    )
    .await
}

/// Resolves the final connection configuration from CLI args, config file, and environment.
///
/// Precedence: CLI arguments, then the named connection, then the default
/// connection, then `PG*` environment variables.
fn resolve_connection(cli: &Cli, config: &Config) -> Result<Option<ConnectionConfig>> {
    let mut connection = cli.to_connection_config()?;

    if connection.is_none() {
        if let Some(name) = cli.connection_name() {
            connection = config.get_connection(Some(name)).cloned();
            if connection.is_none() {
                return Err(BenchError::config(format!(
                    "Connection '{name}' not found in config file"
                )));
            }
        }
    }

    if connection.is_none() {
        connection = config.get_connection(None).cloned();
    }

    if connection.is_none() && std::env::var_os("PGDATABASE").is_some() {
        connection = Some(ConnectionConfig {
            port: 5432,
            ..Default::default()
        });
    }

    if let Some(ref mut conn) = connection {
        conn.apply_env_defaults();
    }

    Ok(connection)
}
