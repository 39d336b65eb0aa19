//! Command-line interface for `arboretl`, a config-driven ETL for municipal
//! tree inventories.
//!
//! This binary parses arguments, configures logging, and delegates to the
//! [`arboretl_pipeline`] library. A run is described entirely by two JSON
//! files: the dataset descriptors and the standard-field template.
//!
//! # Available Commands
//!
//! - `run` - Execute the pipeline over a dataset configuration
//! - `validate` - Check a GeoParquet artifact against the output contract
//! - `formats` - List supported formats and their capabilities
//! - `init` - Write starter configuration files
//!
//! # Exit Codes
//!
//! - `0` - every selected dataset completed; validation results are reported
//!   in the summary, not enforced
//! - `1` - the run itself could not start (configuration error)
//! - `2` - the run completed but some datasets failed or never started

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{Level, info, warn};
use tracing_log::LogTracer;
use tracing_subscriber::FmtSubscriber;

use arboretl_core::{load_descriptors, load_template};
use arboretl_pipeline::orchestrate::{self, DEFAULT_CONCURRENCY, PipelineOptions};
use arboretl_pipeline::{registry, validate};

mod display;

#[derive(Parser)]
#[command(
    name = "arboretl",
    version,
    about = "Municipal tree-inventory ETL: heterogeneous sources in, GeoParquet out",
    long_about = "arboretl retrieves configured municipal tree inventories, standardizes\n\
                  their columns, reprojects to WGS84, and writes spatially clustered,\n\
                  validated GeoParquet artifacts."
)]
struct Cli {
    /// Enable verbose (INFO level) logging output.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug (DEBUG level) logging output with detailed diagnostics.
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands for the `arboretl` CLI.
#[derive(Subcommand)]
enum Commands {
    /// Runs the pipeline over a dataset configuration.
    Run {
        /// Path to the dataset descriptors JSON file.
        #[arg(long, value_name = "FILE")]
        datasets: PathBuf,

        /// Path to the standard-field template JSON file.
        #[arg(long, value_name = "FILE")]
        template: PathBuf,

        /// Directory the per-dataset artifacts are written under.
        #[arg(short, long, value_name = "DIR", default_value = "output")]
        output: PathBuf,

        /// Process only the named dataset (case-insensitive).
        #[arg(long, value_name = "NAME")]
        dataset: Option<String>,

        /// Maximum number of datasets processed concurrently.
        #[arg(long, value_name = "N", default_value_t = DEFAULT_CONCURRENCY)]
        concurrency: usize,

        /// HTTP timeout for dataset downloads, in seconds.
        #[arg(long, value_name = "SECONDS", default_value_t = 30)]
        timeout: u64,
    },

    /// Validates a GeoParquet artifact against the output contract.
    Validate {
        /// Path to the GeoParquet file to check.
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Lists supported formats and their capabilities.
    Formats,

    /// Writes starter configuration files into a directory.
    Init {
        /// Directory for the generated `datasets.json` and `template.json`.
        #[arg(value_name = "DIR", default_value = ".")]
        directory: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        Level::DEBUG
    } else if cli.verbose {
        Level::INFO
    } else {
        Level::WARN
    };

    // Bridge logs from the `log` crate to the `tracing` ecosystem.
    LogTracer::init()?;

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let exit_code = match cli.command {
        Commands::Run {
            datasets,
            template,
            output,
            dataset,
            concurrency,
            timeout,
        } => {
            handle_run(
                &datasets,
                &template,
                output,
                dataset,
                concurrency,
                Duration::from_secs(timeout),
            )
            .await?
        },
        Commands::Validate { input } => handle_validate(&input)?,
        Commands::Formats => {
            handle_formats();
            0
        },
        Commands::Init { directory } => {
            handle_init(&directory)?;
            0
        },
    };

    std::process::exit(exit_code);
}

async fn handle_run(
    datasets_path: &Path,
    template_path: &Path,
    output: PathBuf,
    dataset: Option<String>,
    concurrency: usize,
    timeout: Duration,
) -> Result<i32> {
    let descriptors = load_descriptors(datasets_path)
        .with_context(|| format!("loading '{}'", datasets_path.display()))?;
    let template = load_template(template_path)
        .with_context(|| format!("loading '{}'", template_path.display()))?;
    info!(
        "loaded {} descriptor(s) and {} standard field(s)",
        descriptors.len(),
        template.len()
    );

    let mut options = PipelineOptions::new(output);
    options.dataset = dataset;
    options.concurrency = concurrency;
    options.timeout = timeout;

    // Ctrl-C stops new datasets from starting; in-flight ones finish.
    let cancel = CancellationToken::new();
    let signal_guard = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; finishing in-flight datasets");
            signal_guard.cancel();
        }
    });

    let report = orchestrate::run(&descriptors, &template, &options, &cancel).await?;
    display::display_run_report(&report);
    Ok(report.exit_code())
}

fn handle_validate(input: &Path) -> Result<i32> {
    let report = validate::validate(input)
        .map_err(|err| anyhow!("cannot validate '{}': {err}", input.display()))?;
    display::display_validation(&input.display().to_string(), &report);
    Ok(i32::from(!report.is_valid()))
}

fn handle_formats() {
    display::display_formats(registry::all_formats());
}

const STARTER_DATASETS: &str = r#"[
  {
    "name": "Utrecht",
    "file_type": "csv",
    "download_link": "https://example.org/utrecht-bomen.csv",
    "crs": "EPSG:28992",
    "lon_column": "X",
    "lat_column": "Y",
    "column_mapping": {
      "Latin_name": "Soortnaam"
    },
    "metadata": {
      "Owner": "Gemeente Utrecht"
    }
  }
]
"#;

const STARTER_TEMPLATE: &str = r#"{
  "Latin_name": "scientific species name",
  "Height": "tree height class",
  "Year": "year planted",
  "Owner": "maintaining organization"
}
"#;

fn handle_init(directory: &Path) -> Result<()> {
    std::fs::create_dir_all(directory)
        .with_context(|| format!("creating '{}'", directory.display()))?;

    for (file_name, contents) in [
        ("datasets.json", STARTER_DATASETS),
        ("template.json", STARTER_TEMPLATE),
    ] {
        let path = directory.join(file_name);
        if path.exists() {
            return Err(anyhow!("'{}' already exists; not overwriting", path.display()));
        }
        std::fs::write(&path, contents)
            .with_context(|| format!("writing '{}'", path.display()))?;
        println!("wrote {}", path.display());
    }
    Ok(())
}
