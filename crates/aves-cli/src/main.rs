use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use aves_pipeline::{DownloadResult, ImportStatus, PipelineConfig};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "aves")]
#[command(about = "Bird recording sample, classification and report pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Download the species reference dataset to a file.
    FetchSpecies {
        #[arg(long)]
        output_file: PathBuf,
    },
    /// Seed the species collection from a dataset file (no-op when already populated).
    ImportSpecies {
        #[arg(long)]
        input_file: PathBuf,
    },
    /// Download a random sample of bird recordings.
    FetchSamples {
        #[arg(long)]
        audio_dir: Option<PathBuf>,
    },
    /// Upload, classify and store results for one audio file.
    Classify {
        #[arg(long)]
        input_file: PathBuf,
        /// Exit non-zero when classification fails.
        #[arg(long)]
        fail_on_error: bool,
    },
    /// Write the per-species classification count report.
    Aggregate {
        #[arg(long)]
        output_file: PathBuf,
    },
    /// Fetch samples, classify each download, then aggregate.
    Batch {
        #[arg(long)]
        output_file: PathBuf,
        #[arg(long)]
        audio_dir: Option<PathBuf>,
    },
}

fn load_config(audio_dir: Option<PathBuf>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env()?;
    if let Some(dir) = audio_dir {
        config.audio_dir = dir;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::FetchSpecies { output_file } => {
            let config = load_config(None)?;
            let summary = aves_pipeline::run_fetch_species(&config, &output_file).await?;
            println!(
                "fetch-species complete: run_id={} bytes={} output={}",
                summary.run.run_id, summary.bytes, summary.output_file
            );
        }
        Commands::ImportSpecies { input_file } => {
            let config = load_config(None)?;
            let summary = aves_pipeline::run_import_species(&config, &input_file).await?;
            match summary.status {
                ImportStatus::Skipped { existing } => println!(
                    "import-species skipped: run_id={} existing={}",
                    summary.run.run_id, existing
                ),
                ImportStatus::Imported { inserted } => println!(
                    "import-species complete: run_id={} inserted={}",
                    summary.run.run_id, inserted
                ),
            }
        }
        Commands::FetchSamples { audio_dir } => {
            let config = load_config(audio_dir)?;
            let summary = aves_pipeline::run_fetch_samples(&config).await?;
            for outcome in &summary.outcomes {
                let name = outcome.file_name.as_deref().unwrap_or("<unnamed>");
                match &outcome.result {
                    DownloadResult::Downloaded { path, bytes } => {
                        println!("ok     {name} -> {} ({bytes} bytes)", path.display())
                    }
                    DownloadResult::Failed { reason } => println!("failed {name}: {reason}"),
                }
            }
            println!(
                "fetch-samples complete: run_id={} page={} succeeded={} failed={}",
                summary.run.run_id, summary.page, summary.succeeded, summary.failed
            );
        }
        Commands::Classify {
            input_file,
            fail_on_error,
        } => {
            let outcome =
                aves_pipeline::classify_with_lookup(|key| std::env::var(key).ok(), &input_file).await;
            if let Some(message) = outcome.failure_message() {
                eprintln!("{message}");
            }
            return Ok(ExitCode::from(outcome.exit_code(fail_on_error)));
        }
        Commands::Aggregate { output_file } => {
            let config = load_config(None)?;
            let summary = aves_pipeline::run_aggregate(&config, &output_file).await?;
            println!(
                "aggregate complete: run_id={} species={} rows={} output={}",
                summary.run.run_id, summary.distinct_species, summary.joined_rows, summary.output_file
            );
        }
        Commands::Batch {
            output_file,
            audio_dir,
        } => {
            let config = load_config(audio_dir)?;
            let summary = aves_pipeline::run_batch(&config, &output_file).await?;
            println!(
                "batch complete: downloaded={} download_failures={} classified={} classification_failures={} species={} output={}",
                summary.samples.succeeded,
                summary.samples.failed,
                summary.classified,
                summary.classification_failures,
                summary.aggregate.distinct_species,
                summary.aggregate.output_file
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
