//! Spatial normalization: reproject every geometry into the target CRS and
//! drop rows that have nothing to plot.
//!
//! Rows without a geometry, or with a topologically empty one, are removed
//! here rather than at parse time: parse-side policies deal with *broken*
//! geometry, this stage deals with *absent* geometry.

use arboretl_core::{Crs, CrsError, FeatureTable, geometry};

/// Outcome counts of a normalization pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeSummary {
    /// Rows kept (with a reprojected, non-empty geometry)
    pub kept: usize,
    /// Rows dropped for missing or empty geometry
    pub dropped: usize,
}

/// Reproject `table` in place into `target` and drop geometry-less rows.
pub fn normalize_crs(table: &mut FeatureTable, target: Crs) -> Result<NormalizeSummary, CrsError> {
    let source = table.crs;
    for row in &mut table.rows {
        if let Some(geom) = &mut row.geometry {
            source.transform_geometry(geom, target)?;
        }
    }

    let before = table.rows.len();
    table.rows.retain(|row| {
        row.geometry
            .as_ref()
            .is_some_and(|geom| !geometry::is_empty(geom))
    });
    let kept = table.rows.len();
    let dropped = before - kept;

    table.crs = target;
    if dropped > 0 {
        log::info!("dropped {dropped} row(s) without a usable geometry");
    }
    Ok(NormalizeSummary { kept, dropped })
}
