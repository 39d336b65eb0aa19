//! `arboretl-core` is the core library for the arboretl project, providing the
//! shared vocabulary for municipal tree-inventory ETL.
//!
//! This crate includes:
//! - **Configuration model**: dataset descriptors, the standard-field template,
//!   and load-time validation.
//! - **Feature table**: the in-flight, per-dataset table of geometries plus
//!   attribute columns that the pipeline stages pass along.
//! - **Coordinate reference systems**: the closed set of supported source CRS
//!   and the transforms into the corpus target (WGS84).
//! - **Spatial primitives**: bounding boxes, geometry utilities, and the
//!   Hilbert curve index used for spatial row ordering.

pub mod config;
pub mod crs;
pub mod error;
pub mod geometry;
pub mod hilbert;
pub mod model;

pub use config::{
    DatasetDescriptor, FileType, GeometrySpec, InvalidGeometryPolicy, Template, load_descriptors,
    load_template,
};
pub use crs::Crs;
pub use error::{ConfigError, CoreError, CrsError, IoError, Result};
pub use geometry::BoundingBox;
pub use model::{AttrValue, FeatureRow, FeatureTable, GEOMETRY_COLUMN, MISSING_VALUE};
