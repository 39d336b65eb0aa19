//! Display utilities for formatting CLI output.
//!
//! Table row structures and formatting functions for presenting run reports,
//! validation results, and format capabilities in a human-readable way.

use tabled::{Table, Tabled};

use arboretl_pipeline::registry::FormatDriver;
use arboretl_pipeline::report::RunReport;
use arboretl_pipeline::validate::{CheckStatus, ValidationReport};

/// Table row representation for a format registry entry.
#[derive(Tabled)]
pub struct FormatRow {
    /// Short identifier for the format (e.g., `geoparquet`).
    #[tabled(rename = "Short Name")]
    pub short_name: String,
    /// Full descriptive name of the format.
    #[tabled(rename = "Long Name")]
    pub long_name: String,
    /// Support status for reading data from this format.
    #[tabled(rename = "Read")]
    pub read: String,
    /// Support status for writing data to this format.
    #[tabled(rename = "Write")]
    pub write: String,
}

/// Table row representation for one dataset's run outcome.
#[derive(Tabled)]
pub struct OutcomeRow {
    #[tabled(rename = "Dataset")]
    pub name: String,
    #[tabled(rename = "State")]
    pub state: String,
    #[tabled(rename = "Rows")]
    pub rows: String,
    #[tabled(rename = "Dropped")]
    pub dropped: String,
    #[tabled(rename = "Validation")]
    pub validation: String,
    #[tabled(rename = "Error")]
    pub error: String,
}

/// Table row representation for one validator check.
#[derive(Tabled)]
pub struct CheckRow {
    #[tabled(rename = "Check")]
    pub name: String,
    #[tabled(rename = "Status")]
    pub status: String,
    #[tabled(rename = "Detail")]
    pub detail: String,
}

/// Print the format registry as a table.
pub fn display_formats(formats: &[FormatDriver]) {
    println!("\nSupported Formats ({} total):\n", formats.len());

    let rows: Vec<FormatRow> = formats
        .iter()
        .map(|d| FormatRow {
            short_name: d.short_name.to_string(),
            long_name: d.long_name.to_string(),
            read: d.capabilities.read.as_str().to_string(),
            write: d.capabilities.write.as_str().to_string(),
        })
        .collect();

    let table = Table::new(rows).to_string();
    println!("{table}");
}

/// Print the per-dataset outcomes of a batch run as a table.
pub fn display_run_report(report: &RunReport) {
    let rows: Vec<OutcomeRow> = report
        .outcomes
        .iter()
        .map(|o| OutcomeRow {
            name: o.name.clone(),
            state: o.state.to_string(),
            rows: o.rows_written.to_string(),
            dropped: o.rows_dropped.to_string(),
            validation: o.validation.map_or_else(
                || "-".to_string(),
                |v| format!("{} passed / {} warning(s)", v.passed, v.warnings),
            ),
            error: o.error.clone().unwrap_or_default(),
        })
        .collect();

    let table = Table::new(rows).to_string();
    println!("{table}");
    println!(
        "\n{} dataset(s) succeeded, {} failed",
        report.succeeded(),
        report.failed()
    );
}

/// Print a validation report as a table plus a one-line verdict.
pub fn display_validation(path: &str, report: &ValidationReport) {
    println!("\nValidation of {path}:\n");

    let rows: Vec<CheckRow> = report
        .checks
        .iter()
        .map(|c| CheckRow {
            name: c.name.to_string(),
            status: match c.status {
                CheckStatus::Pass => "pass",
                CheckStatus::Fail => "FAIL",
                CheckStatus::Warning => "warning",
            }
            .to_string(),
            detail: c.detail.clone(),
        })
        .collect();

    let table = Table::new(rows).to_string();
    println!("{table}");
    println!(
        "\n{}: {}",
        if report.is_valid() { "VALID" } else { "INVALID" },
        report.summary()
    );
}
