use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};

use remedian::alert::TracingAlertGateway;
use remedian::recovery::TracingRunner;
use remedian::{
    AnalysisScheduler, ErrorEvent, FaultResponseEngine, MetricSample, RemedianConfig,
};

#[derive(Parser)]
#[command(
    name = "remedian",
    version,
    about = "Automated fault response: classify, recover, predict"
)]
struct Cli {
    /// Log filter (overrides RUST_LOG)
    #[arg(long, global = true)]
    log: Option<String>,

    /// Emit logs as line-delimited JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Path to a TOML config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a synthetic error stream through the full pipeline and print
    /// what the engine did with it
    Demo {
        /// Number of live error events to handle
        #[arg(long, default_value_t = 8)]
        events: usize,
    },
    /// Validate a configuration file and exit
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    remedian::telemetry::init_tracing(cli.log.as_deref(), cli.json_logs);

    let config = match &cli.config {
        Some(path) => RemedianConfig::load(path)?,
        None => RemedianConfig::default(),
    };

    match cli.command {
        Commands::Demo { events } => run_demo(config, events).await,
        Commands::CheckConfig => {
            config.validate()?;
            println!("configuration OK");
            Ok(())
        }
    }
}

async fn run_demo(config: RemedianConfig, events: usize) -> Result<()> {
    let engine = Arc::new(FaultResponseEngine::new(
        config.clone(),
        Arc::new(TracingRunner),
        Arc::new(TracingAlertGateway),
    )?);
    let store = engine.store();
    let now = Utc::now();

    // Response-time history for checkout: steady, then a hard spike.
    for i in 0..24 {
        store.record_metric(
            "checkout",
            "response_time_ms",
            MetricSample::new(
                now - Duration::minutes(25 - i),
                if i % 2 == 0 { 700.0 } else { 900.0 },
            ),
        );
    }
    store.record_metric(
        "checkout",
        "response_time_ms",
        MetricSample::new(now - Duration::minutes(1), 1_400.0),
    );

    // A timeout burst building up over the last half hour, on top of a
    // quieter older history: enough signal for the predictor.
    for i in 0..10i64 {
        store.record_event(
            ErrorEvent::new("checkout", "DatabaseTimeout", "query exceeded deadline")
                .with_occurred_at(now - Duration::minutes(230 - i * 10))
                .with_response_time(1_100),
        );
    }
    for i in 0..140i64 {
        store.record_event(
            ErrorEvent::new("checkout", "DatabaseTimeout", "query exceeded deadline")
                .with_occurred_at(now - Duration::minutes((140 - i) / 4))
                .with_response_time(1_300),
        );
    }

    // Live events across services, the inline path end to end.
    let stream = [
        ("checkout", "ConnectionTimeout", "upstream timed out"),
        ("payments", "MemoryError", "allocation failed"),
        ("search", "ConnectionError", "connection refused"),
        ("checkout", "ValidationError", "malformed payload"),
        ("payments", "APIError", "unexpected 502"),
        ("search", "XyzUnknownError", "never seen before"),
    ];
    println!("── handling {events} error events ──");
    for i in 0..events {
        let (service, error_type, message) = stream[i % stream.len()];
        let handled = engine
            .handle_error(ErrorEvent::new(service, error_type, message))
            .await?;
        println!(
            "{service:<10} {error_type:<18} severity={:<8} recovered={} attempts={}",
            handled.severity.to_string(),
            handled.outcome.recovered,
            handled.outcome.actions.len(),
        );
    }

    // One batch sweep, the way the scheduler would run it.
    let scheduler = Arc::new(AnalysisScheduler::new(engine.clone(), &config.scheduler));
    let analyzed = scheduler.run_once().await;
    println!("\n── batch sweep analyzed {analyzed} services ──");

    let report = engine.run_analysis("checkout").await?;
    println!("\n── checkout analysis ──");
    println!("{}", serde_json::to_string_pretty(&report)?);

    println!("\n── store summary ──");
    println!("{}", serde_json::to_string_pretty(&store.summary())?);
    Ok(())
}
