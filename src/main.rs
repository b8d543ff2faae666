//! GMM Anomaly Detection - Main Entry Point
//!
//! Loads transaction records, fits a Gaussian mixture, and reports the records
//! whose max cluster-membership probability falls below a quantile threshold.

use anomaly_detection_gmm::{
    config::{AppConfig, LoggingConfig, ReportFormat},
    metrics::{RunMetrics, Stage},
    pipeline::DetectionPipeline,
    report::Reporter,
    session::Session,
    types::InputLocation,
    PipelineError,
};
use anyhow::{Context, Result};
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "anomaly-detection-gmm")]
#[command(about = "Flag anomalous transactions with a Gaussian mixture model")]
struct Args {
    /// Configuration file (TOML); missing file means built-in defaults
    #[arg(long, default_value = "config/config.toml")]
    config: PathBuf,

    /// Input parquet file, local path or s3://bucket/key
    #[arg(long)]
    input: Option<String>,

    /// Number of mixture components (k)
    #[arg(long)]
    components: Option<usize>,

    /// Seed for the mixture fit
    #[arg(long)]
    seed: Option<u64>,

    /// Score quantile used as the anomaly threshold
    #[arg(long)]
    quantile: Option<f64>,

    /// Rank error bound of the quantile (0 = exact)
    #[arg(long)]
    relative_error: Option<f64>,

    /// Report format
    #[arg(long, value_parser = ["table", "json"])]
    format: Option<String>,

    /// Anomalies shown in the table report
    #[arg(long)]
    max_rows: Option<usize>,
}

impl Args {
    fn apply(&self, config: &mut AppConfig) {
        if let Some(input) = &self.input {
            config.input.path = input.clone();
        }
        if let Some(components) = self.components {
            config.model.components = components;
        }
        if let Some(seed) = self.seed {
            config.model.seed = seed;
        }
        if let Some(quantile) = self.quantile {
            config.detection.quantile = quantile;
        }
        if let Some(relative_error) = self.relative_error {
            config.detection.relative_error = relative_error;
        }
        if let Some(format) = &self.format {
            config.report.format = if format == "json" {
                ReportFormat::Json
            } else {
                ReportFormat::Table
            };
        }
        if let Some(max_rows) = self.max_rows {
            config.report.max_rows = max_rows;
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e
                .downcast_ref::<PipelineError>()
                .map(|p| p.kind().exit_code())
                .unwrap_or(1);
            error!(error = %format!("{:#}", e), exit_code = code, "Anomaly detection failed");
            eprintln!("Error: {:#}", e);
            ExitCode::from(code as u8)
        }
    }
}

fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("anomaly_detection_gmm={}", config.level)))?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let mut config = AppConfig::load_from_path(&args.config)?;
    args.apply(&mut config);

    init_logging(&config.logging)?;
    info!("Starting GMM anomaly detection");
    info!(
        input = %config.input.path,
        components = config.model.components,
        seed = config.model.seed,
        quantile = config.detection.quantile,
        relative_error = config.detection.relative_error,
        "Configuration loaded"
    );

    let pipeline = DetectionPipeline::from_config(&config)?;
    let reporter = Reporter::from(&config.report);
    let location: InputLocation = config.input.path.parse()?;

    let session = Session::open(&config.input).await?;
    let outcome = detect(&session, &location, &pipeline, &reporter).await;
    session.close();
    outcome
}

async fn detect(
    session: &Session,
    location: &InputLocation,
    pipeline: &DetectionPipeline,
    reporter: &Reporter,
) -> Result<()> {
    let mut metrics = RunMetrics::new();

    let started = Instant::now();
    let records = session
        .read_parquet(location)
        .await
        .with_context(|| format!("Failed to load data from {}", location))?;
    metrics.record_stage(Stage::Load, started.elapsed());

    let mut stdout = std::io::stdout().lock();
    reporter.loaded(&mut stdout, location)?;
    reporter.check(&records)?;

    let detection = tokio::task::block_in_place(|| pipeline.run(&records, &mut metrics))?;

    reporter.write(&mut stdout, &records, &detection)?;
    stdout.flush()?;

    metrics.print_summary();
    Ok(())
}
