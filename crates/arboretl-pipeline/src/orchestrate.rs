//! The batch orchestrator: drives every dataset through the stage chain with
//! bounded concurrency and full per-dataset error isolation.
//!
//! One broken feed never takes the batch down. A dataset that fails at any
//! stage is recorded as failed and the rest keep going; only configuration
//! problems that precede the batch (unreadable config, duplicate names) abort
//! the run itself.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use arboretl_core::{Crs, DatasetDescriptor, IoError, Template};
use arboretl_geoparquet::WriteOptions;

use crate::error::Result;
use crate::report::{DatasetOutcome, DatasetState, RunReport, ValidationSummary};
use crate::retrieve::Retriever;
use crate::{layout, normalize, parse, standardize, validate};

/// Default number of datasets processed concurrently.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Default per-request timeout for dataset downloads.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Knobs for a batch run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Root directory the per-dataset artifacts land under
    pub output_dir: PathBuf,
    /// CRS every output is normalized to
    pub target_crs: Crs,
    /// Maximum datasets in flight at once
    pub concurrency: usize,
    /// HTTP timeout for dataset downloads
    pub timeout: Duration,
    /// When set, only the dataset with this name (case-insensitive) runs
    pub dataset: Option<String>,
    /// GeoParquet writer tuning
    pub write_options: WriteOptions,
}

impl PipelineOptions {
    /// Default options writing under `output_dir`.
    #[must_use]
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            target_crs: Crs::Wgs84,
            concurrency: DEFAULT_CONCURRENCY,
            timeout: DEFAULT_TIMEOUT,
            dataset: None,
            write_options: WriteOptions::default(),
        }
    }
}

/// Where a dataset's artifact lands: `<output_dir>/<name>/<name>.parquet`.
#[must_use]
pub fn output_path(output_dir: &Path, name: &str) -> PathBuf {
    output_dir.join(name).join(format!("{name}.parquet"))
}

/// Object-store key for a dataset artifact under a bucket prefix, mirroring
/// the on-disk layout.
#[must_use]
pub fn remote_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        format!("{name}/{name}.parquet")
    } else {
        format!("{prefix}/{name}/{name}.parquet")
    }
}

/// Run the pipeline over `descriptors` and report per-dataset outcomes.
///
/// Cancellation is coarse: a cancelled token stops new datasets from
/// starting, while datasets already in flight run to completion.
pub async fn run(
    descriptors: &[DatasetDescriptor],
    template: &Template,
    options: &PipelineOptions,
    cancel: &CancellationToken,
) -> Result<RunReport> {
    let selected: Vec<&DatasetDescriptor> = match &options.dataset {
        Some(filter) => {
            let matched: Vec<&DatasetDescriptor> = descriptors
                .iter()
                .filter(|d| d.name.eq_ignore_ascii_case(filter))
                .collect();
            if matched.is_empty() {
                log::warn!("no dataset named '{filter}' in the configuration");
            }
            matched
        },
        None => descriptors.iter().collect(),
    };

    let retriever = Retriever::new(options.timeout)?;
    log::info!(
        "starting run over {} dataset(s), concurrency {}",
        selected.len(),
        options.concurrency
    );

    let mut indexed: Vec<(usize, DatasetOutcome)> = futures::stream::iter(
        selected.iter().enumerate().map(|(index, descriptor)| {
            let retriever = &retriever;
            async move {
                let outcome = if cancel.is_cancelled() {
                    log::warn!("[{}] skipped: run cancelled", descriptor.name);
                    DatasetOutcome::pending(&descriptor.name, "run cancelled")
                } else {
                    process_dataset(descriptor, template, options, retriever).await
                };
                (index, outcome)
            }
        }),
    )
    .buffer_unordered(options.concurrency.max(1))
    .collect()
    .await;

    // Outcomes arrive in completion order; report in input order.
    indexed.sort_by_key(|(index, _)| *index);
    let report = RunReport {
        outcomes: indexed.into_iter().map(|(_, outcome)| outcome).collect(),
    };
    log::info!(
        "run finished: {} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
    Ok(report)
}

/// One dataset through the whole chain, every error caught into the outcome.
async fn process_dataset(
    descriptor: &DatasetDescriptor,
    template: &Template,
    options: &PipelineOptions,
    retriever: &Retriever,
) -> DatasetOutcome {
    match run_dataset(descriptor, template, options, retriever).await {
        Ok(outcome) => outcome,
        Err(err) => {
            log::error!("[{}] failed: {err}", descriptor.name);
            DatasetOutcome::failed(&descriptor.name, err.to_string())
        },
    }
}

async fn run_dataset(
    descriptor: &DatasetDescriptor,
    template: &Template,
    options: &PipelineOptions,
    retriever: &Retriever,
) -> Result<DatasetOutcome> {
    let name = &descriptor.name;
    descriptor.validate(template)?;

    let workdir = tempfile::tempdir().map_err(|source| IoError::CreateDir {
        path: std::env::temp_dir(),
        source,
    })?;

    let source_path = retriever.fetch(descriptor, workdir.path()).await?;
    log::info!("[{name}] {}", DatasetState::Retrieved);

    let mut table = parse::parse(&source_path, descriptor).await?;
    log::info!("[{name}] {}", DatasetState::Parsed);

    let standardized = standardize::standardize(&mut table, descriptor, template);
    if !standardized.missing_fields.is_empty() {
        log::info!(
            "[{name}] {} standard field(s) filled with the sentinel",
            standardized.missing_fields.len()
        );
    }
    log::info!("[{name}] {}", DatasetState::Standardized);

    let normalized = normalize::normalize_crs(&mut table, options.target_crs)?;
    log::info!("[{name}] {}", DatasetState::Reprojected);

    let artifact = output_path(&options.output_dir, name);
    if let Some(parent) = artifact.parent() {
        std::fs::create_dir_all(parent).map_err(|source| IoError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    arboretl_geoparquet::write_geoparquet(&artifact, &table, None, &options.write_options)?;

    let laid_out = layout::apply(&artifact, &options.write_options)?;
    log::info!("[{name}] {}", DatasetState::Sorted);

    let report = validate::validate(&artifact)?;
    log::info!("[{name}] {}: {}", DatasetState::Validated, report.summary());
    if !report.is_valid() {
        for check in &report.checks {
            if check.status == crate::validate::CheckStatus::Fail {
                log::error!("[{name}] check '{}' failed: {}", check.name, check.detail);
            }
        }
    }

    log::info!(
        "[{name}] {}: {} row(s) at '{}'",
        DatasetState::Done,
        laid_out.rows,
        artifact.display()
    );
    Ok(DatasetOutcome {
        name: name.clone(),
        state: DatasetState::Done,
        rows_written: laid_out.rows,
        rows_dropped: normalized.dropped,
        validation: Some(ValidationSummary {
            is_valid: report.is_valid(),
            passed: report.passed_count(),
            failed: report.failed_count(),
            warnings: report.warning_count(),
        }),
        error: None,
    })
}
