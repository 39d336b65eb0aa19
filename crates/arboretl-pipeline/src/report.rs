//! Per-dataset outcomes and the aggregate run report.

use std::fmt;

/// The furthest stage a dataset reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatasetState {
    Pending,
    Retrieved,
    Parsed,
    Standardized,
    Reprojected,
    Sorted,
    Validated,
    Done,
    Failed,
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DatasetState::Pending => "pending",
            DatasetState::Retrieved => "retrieved",
            DatasetState::Parsed => "parsed",
            DatasetState::Standardized => "standardized",
            DatasetState::Reprojected => "reprojected",
            DatasetState::Sorted => "sorted",
            DatasetState::Validated => "validated",
            DatasetState::Done => "done",
            DatasetState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Validation tallies carried into the run report.
#[derive(Debug, Clone, Copy)]
pub struct ValidationSummary {
    pub is_valid: bool,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
}

/// What happened to one dataset during a run.
#[derive(Debug, Clone)]
pub struct DatasetOutcome {
    pub name: String,
    pub state: DatasetState,
    /// Rows in the final artifact
    pub rows_written: usize,
    /// Rows dropped for missing or empty geometry
    pub rows_dropped: usize,
    /// Validator tallies, present once validation ran
    pub validation: Option<ValidationSummary>,
    /// Error message for failed or cancelled datasets
    pub error: Option<String>,
}

impl DatasetOutcome {
    /// Outcome for a dataset that never got to run.
    #[must_use]
    pub fn pending(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: DatasetState::Pending,
            rows_written: 0,
            rows_dropped: 0,
            validation: None,
            error: Some(reason.into()),
        }
    }

    /// Outcome for a dataset that failed partway.
    #[must_use]
    pub fn failed(name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: DatasetState::Failed,
            rows_written: 0,
            rows_dropped: 0,
            validation: None,
            error: Some(error.into()),
        }
    }

    /// Whether the dataset produced a finished artifact.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.state == DatasetState::Done
    }
}

/// Aggregate outcome of a batch run, in input order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub outcomes: Vec<DatasetOutcome>,
}

impl RunReport {
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    #[must_use]
    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Process exit code for the run: 0 when everything succeeded, 2 when
    /// some datasets failed. Run-fatal errors never reach a report.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.failed() == 0 { 0 } else { 2 }
    }
}
