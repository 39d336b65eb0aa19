//! Error taxonomy for the core configuration and spatial primitives.
//!
//! One `thiserror` enum per concern. Descriptor-scoped errors carry the
//! dataset name; only configuration-file-level errors are run-fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Root error type for core operations.
///
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration errors (malformed or inconsistent descriptors)
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Coordinate reference system errors
    #[error(transparent)]
    Crs(#[from] CrsError),

    /// I/O errors (file read/write, path issues)
    #[error(transparent)]
    Io(#[from] IoError),
}

/// Configuration errors.
///
/// Descriptor-scoped variants carry the dataset name so the orchestrator can
/// surface which feed is broken; file-scoped variants are run-fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a configuration or template file
    #[error("Failed to read config file '{path}': {source}")]
    Unreadable {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// A configuration or template file is not valid JSON of the expected shape
    #[error("Failed to parse config file '{path}': {source}")]
    Unparseable {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: serde_json::Error,
    },

    /// Two descriptors share a name
    #[error("Duplicate dataset name '{name}' in configuration")]
    DuplicateName {
        /// The repeated dataset name
        name: String,
    },

    /// A descriptor declares neither a download link nor a local path
    #[error("Dataset '{dataset}' has no download link and no local path")]
    NoSource {
        /// The dataset name
        dataset: String,
    },

    /// A CSV descriptor declares both geometry specifications
    #[error(
        "Dataset '{dataset}' declares both a WKT column and lon/lat columns; exactly one geometry spec is allowed"
    )]
    AmbiguousGeometrySpec {
        /// The dataset name
        dataset: String,
    },

    /// A CSV descriptor declares no geometry specification
    #[error(
        "CSV dataset '{dataset}' declares no geometry spec; set wkt_column or lon_column/lat_column"
    )]
    MissingGeometrySpec {
        /// The dataset name
        dataset: String,
    },

    /// A required descriptor field is missing for the declared format
    #[error("Dataset '{dataset}' is missing required field '{field}'")]
    MissingField {
        /// The dataset name
        dataset: String,
        /// The missing field
        field: String,
    },

    /// A descriptor field holds an invalid value
    #[error("Dataset '{dataset}' has invalid {field}: {message}")]
    InvalidField {
        /// The dataset name
        dataset: String,
        /// The offending field
        field: String,
        /// Why it is invalid
        message: String,
    },

    /// A column mapping key is not part of the template's standard field set
    #[error("Dataset '{dataset}' maps unknown standard field '{field}' (not in template)")]
    UnknownStandardField {
        /// The dataset name
        dataset: String,
        /// The unknown mapping key
        field: String,
    },
}

impl ConfigError {
    /// Whether the error invalidates the whole run rather than one dataset.
    ///
    /// File-level problems (unreadable/unparseable config, duplicate names)
    /// mean the batch cannot proceed; everything else fails only the dataset
    /// that carries the inconsistency.
    #[must_use]
    pub fn is_run_fatal(&self) -> bool {
        matches!(
            self,
            ConfigError::Unreadable { .. }
                | ConfigError::Unparseable { .. }
                | ConfigError::DuplicateName { .. }
        )
    }
}

/// Coordinate reference system errors.
#[derive(Debug, Error)]
pub enum CrsError {
    /// The CRS designation string could not be parsed
    #[error("Unrecognized CRS designation '{value}'")]
    Unrecognized {
        /// The designation as found in the configuration or container
        value: String,
    },

    /// The EPSG code is syntactically valid but not in the supported set
    #[error("Unsupported source CRS EPSG:{epsg}; supported: 4326, 4258, 3857, 28992")]
    Unsupported {
        /// The EPSG code
        epsg: u32,
    },

    /// Reprojection was requested into something other than WGS84
    #[error("Unsupported reprojection target EPSG:{epsg}; only EPSG:4326 is supported")]
    UnsupportedTarget {
        /// The EPSG code
        epsg: u32,
    },
}

/// Filesystem errors outside the format readers and writers, which carry
/// their own I/O kinds.
#[derive(Debug, Error)]
pub enum IoError {
    /// Failed to create a directory
    #[error("Failed to create directory '{path}': {source}")]
    CreateDir {
        /// The directory path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },
}

/// Type alias for Results using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;
