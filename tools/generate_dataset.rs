//! Synthetic Dataset Generator
//!
//! Writes a parquet file of synthetic transactions (two Gaussian blobs plus
//! labelled outliers) for running the detector locally.

use anomaly_detection_gmm::synthetic::SyntheticDataset;
use anyhow::{Context, Result};
use clap::Parser;
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;
use std::fs::File;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "generate-dataset")]
#[command(about = "Write a synthetic transaction parquet file")]
struct Args {
    /// Output parquet file
    #[arg(long, default_value = "data/synthetic.parquet")]
    output: PathBuf,

    /// Records per blob
    #[arg(long, default_value = "495")]
    blob_size: usize,

    /// Outlier records
    #[arg(long, default_value = "10")]
    outliers: usize,

    /// Distance of each blob from the midpoint
    #[arg(long, default_value = "3.0")]
    half_separation: f64,

    /// RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("generate_dataset=info".parse()?),
        )
        .init();

    let args = Args::parse();
    let dataset = SyntheticDataset {
        blob_size: args.blob_size,
        outliers: args.outliers,
        half_separation: args.half_separation,
        seed: args.seed,
    };

    info!(
        output = %args.output.display(),
        records = dataset.len(),
        outliers = dataset.outliers,
        seed = dataset.seed,
        "Generating synthetic transactions"
    );

    let batch = dataset
        .generate_batch()
        .context("Failed to build record batch")?;

    if let Some(parent) = args.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let file = File::create(&args.output).context("Failed to create parquet file")?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .context("Failed to create ArrowWriter")?;
    writer
        .write(&batch)
        .context("Failed to write record batch")?;
    writer.close().context("Failed to close writer")?;

    info!(
        rows = batch.num_rows(),
        outlier_rows = ?dataset.outlier_rows(),
        "Dataset written"
    );
    Ok(())
}
