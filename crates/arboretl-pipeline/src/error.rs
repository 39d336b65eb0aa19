//! The pipeline's root error type.
//!
//! Every stage has its own error enum; this module composes them so the
//! orchestrator can catch one type at the dataset boundary and still tell
//! run-fatal configuration problems apart from dataset-scoped failures.

use thiserror::Error;

use arboretl_core::{ConfigError, CoreError, CrsError, IoError};
use arboretl_shared::{FormatReadError, FormatWriteError};

use crate::retrieve::RetrieveError;

/// Root error for a dataset pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration errors (descriptor- or file-scoped)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Coordinate reference system errors
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// I/O errors from the core helpers
    #[error(transparent)]
    Io(#[from] IoError),

    /// Retrieval failures (network, status, missing local file)
    #[error(transparent)]
    Retrieve(#[from] RetrieveError),

    /// Source could not be read into a feature table
    #[error(transparent)]
    Read(#[from] FormatReadError),

    /// Output artifact could not be written
    #[error(transparent)]
    Write(#[from] FormatWriteError),
}

impl PipelineError {
    /// Whether the error invalidates the whole batch run.
    ///
    /// Only configuration-file-level problems qualify; everything else is
    /// isolated to the dataset that raised it.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, PipelineError::Config(err) if err.is_run_fatal())
    }
}

impl From<CoreError> for PipelineError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config(err) => PipelineError::Config(err),
            CoreError::Crs(err) => PipelineError::Crs(err),
            CoreError::Io(err) => PipelineError::Io(err),
        }
    }
}

/// Type alias for Results using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
