//! `arboretl-pipeline` chains the stages that turn a configured municipal
//! tree inventory into a validated GeoParquet artifact:
//!
//! retrieve -> parse -> standardize -> normalize -> write -> layout -> validate
//!
//! The [`orchestrate`] module runs the chain over a whole configuration with
//! bounded concurrency; each stage is also usable on its own.

pub mod error;
pub mod layout;
pub mod normalize;
pub mod orchestrate;
pub mod parse;
pub mod registry;
pub mod report;
pub mod retrieve;
pub mod standardize;
pub mod validate;

pub use error::{PipelineError, Result};
pub use orchestrate::{PipelineOptions, output_path, remote_key, run};
pub use report::{DatasetOutcome, DatasetState, RunReport, ValidationSummary};
pub use retrieve::{RetrieveError, Retriever};
pub use validate::{CheckResult, CheckStatus, ValidationReport};
