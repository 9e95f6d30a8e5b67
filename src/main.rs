//! CLI entry point for the road safety report generator.
//!
//! `run` downloads the road segment and infographics query results and
//! writes the segment and road reports; `process` rebuilds the reports from
//! the raw files a previous run saved.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use road_safety_report::{
    config::{self, Config, DEFAULT_DATA_DIR},
    fetch::BasicClient,
    output::print_json,
    pipeline::{self, RunSummary},
};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "road_safety_report")]
#[command(about = "Ranks road segments and roads by fatal and severe accidents per km", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Download both sources and generate the reports
    Run {
        /// Query-result URL of the road segments table
        #[arg(long, env = "ROAD_SEGMENTS_URL", hide_env_values = true)]
        road_segments_url: Option<String>,

        /// Query-result URL of the per-segment infographics data
        #[arg(long, env = "INFOGRAPHICS_URL", hide_env_values = true)]
        infographics_url: Option<String>,

        /// Directory holding source_data/ and output_data/
        #[arg(short, long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,

        /// Per-request timeout in seconds
        #[arg(short, long, env = "FETCH_TIMEOUT_SECS", default_value_t = 30)]
        timeout_secs: u64,
    },
    /// Regenerate the reports from previously downloaded source files
    Process {
        /// Directory holding source_data/ and output_data/
        #[arg(short, long, env = "DATA_DIR", default_value = DEFAULT_DATA_DIR)]
        data_dir: PathBuf,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/road_safety_report.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("road_safety_report.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let summary = match cli.command {
        Commands::Run {
            road_segments_url,
            infographics_url,
            data_dir,
            timeout_secs,
        } => {
            let config = Config::new(
                road_segments_url,
                infographics_url,
                data_dir,
                Duration::from_secs(timeout_secs),
            )?;
            let client = BasicClient::new(config.timeout).context("failed to build HTTP client")?;

            pipeline::run(&client, &config).await?
        }
        Commands::Process { data_dir } => {
            pipeline::process_saved(&config::source_dir(&data_dir), &config::output_dir(&data_dir))?
        }
    };

    report(&summary)?;
    Ok(())
}

fn report(summary: &RunSummary) -> Result<()> {
    info!(
        segments = summary.segments,
        segments_1_km_and_above = summary.segments_1_km_and_above,
        roads = summary.roads,
        roads_1_km_and_above = summary.roads_1_km_and_above,
        output_dir = %summary.output_dir.display(),
        "Reports written"
    );
    print_json(summary)
}
