//! Structural validation of a produced GeoParquet artifact.
//!
//! Re-opens the file from disk and runs a fixed battery of checks, so the
//! verdict reflects what a consumer will actually see rather than what the
//! writer intended. Failures mean the artifact is unusable; warnings flag
//! quality issues a consumer can live with.

use std::path::Path;

use arboretl_core::{Crs, InvalidGeometryPolicy, geometry};
use arboretl_geoparquet::GeoParquetContents;

use crate::error::Result;

/// Verdict of a single check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Fail,
    Warning,
}

/// One entry in a validation report.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Stable check name for report output
    pub name: &'static str,
    pub status: CheckStatus,
    /// Human-readable explanation of the verdict
    pub detail: String,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Pass,
            detail: detail.into(),
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Fail,
            detail: detail.into(),
        }
    }

    fn warning(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: CheckStatus::Warning,
            detail: detail.into(),
        }
    }
}

/// Outcome of the full check battery against one file.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub checks: Vec<CheckResult>,
}

impl ValidationReport {
    /// Valid means zero failed checks; warnings do not disqualify.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.failed_count() == 0
    }

    #[must_use]
    pub fn passed_count(&self) -> usize {
        self.count(CheckStatus::Pass)
    }

    #[must_use]
    pub fn failed_count(&self) -> usize {
        self.count(CheckStatus::Fail)
    }

    #[must_use]
    pub fn warning_count(&self) -> usize {
        self.count(CheckStatus::Warning)
    }

    /// One-line tally for logs and the run report.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} warning(s)",
            self.passed_count(),
            self.failed_count(),
            self.warning_count()
        )
    }

    fn count(&self, status: CheckStatus) -> usize {
        self.checks.iter().filter(|c| c.status == status).count()
    }

    fn push(&mut self, check: CheckResult) {
        self.checks.push(check);
    }
}

/// Run the full check battery against the GeoParquet file at `path`.
pub fn validate(path: &Path) -> Result<ValidationReport> {
    let mut report = ValidationReport::default();

    let metadata = arboretl_geoparquet::read_geo_metadata(path)?;
    match &metadata {
        Some(meta) => {
            report.push(CheckResult::pass(
                "geo metadata",
                format!("geo key present, version {}", meta.version),
            ));
            if meta.encoding.eq_ignore_ascii_case("wkb") {
                report.push(CheckResult::pass("wkb encoding", "geometry encoded as WKB"));
            } else {
                report.push(CheckResult::fail(
                    "wkb encoding",
                    format!("geometry encoding is '{}', expected WKB", meta.encoding),
                ));
            }
        },
        None => {
            report.push(CheckResult::fail(
                "geo metadata",
                "file metadata carries no geo key",
            ));
            report.push(CheckResult::fail(
                "wkb encoding",
                "cannot verify encoding without geo metadata",
            ));
        },
    }

    // Abort on the first broken geometry: the decode check itself is what
    // tolerance would mask.
    let contents = match arboretl_geoparquet::read_geoparquet_full(
        path,
        InvalidGeometryPolicy::Abort,
        Crs::Wgs84,
    ) {
        Ok(contents) => {
            report.push(CheckResult::pass(
                "geometry decoding",
                format!("all {} geometry cell(s) decode", contents.table.len()),
            ));
            contents
        },
        Err(err) if err.is_geometry() => {
            report.push(CheckResult::fail("geometry decoding", err.to_string()));
            // Every remaining check needs decoded rows; stop here.
            return Ok(report);
        },
        Err(err) => return Err(err.into()),
    };

    check_rows(&mut report, &contents, metadata.as_ref());

    let compressions = arboretl_geoparquet::compression_names(path)?;
    if !compressions.is_empty() && compressions.iter().all(|name| name.starts_with("ZSTD")) {
        report.push(CheckResult::pass(
            "zstd compression",
            "all column chunks ZSTD-compressed",
        ));
    } else if compressions.is_empty() {
        report.push(CheckResult::pass(
            "zstd compression",
            "no column chunks written",
        ));
    } else {
        report.push(CheckResult::warning(
            "zstd compression",
            format!("codecs in use: {}", compressions.join(", ")),
        ));
    }

    Ok(report)
}

fn check_rows(
    report: &mut ValidationReport,
    contents: &GeoParquetContents,
    metadata: Option<&arboretl_geoparquet::GeoMetadata>,
) {
    let table = &contents.table;

    let has_covering = metadata.is_some_and(|m| m.has_bbox_covering);
    if contents.had_bbox_column && has_covering {
        report.push(CheckResult::pass(
            "bbox covering",
            "bbox column present and declared in geo metadata",
        ));
    } else if contents.had_bbox_column {
        report.push(CheckResult::fail(
            "bbox covering",
            "bbox column present but not declared as a covering",
        ));
    } else {
        report.push(CheckResult::fail("bbox covering", "no bbox column"));
    }

    let mut bbox_mismatches = 0usize;
    if contents.had_bbox_column {
        for (row, stored) in table.rows.iter().zip(&contents.bboxes) {
            let computed = row.geometry.as_ref().and_then(geometry::bounding_box);
            if computed != *stored {
                bbox_mismatches += 1;
            }
        }
        if bbox_mismatches == 0 {
            report.push(CheckResult::pass(
                "bbox accuracy",
                "stored bboxes match recomputed bboxes exactly",
            ));
        } else {
            report.push(CheckResult::fail(
                "bbox accuracy",
                format!("{bbox_mismatches} row(s) with a stale or wrong bbox"),
            ));
        }
    }

    let missing = table
        .rows
        .iter()
        .filter(|row| {
            row.geometry
                .as_ref()
                .is_none_or(geometry::is_empty)
        })
        .count();
    if missing == 0 {
        report.push(CheckResult::pass(
            "geometry presence",
            "every row carries a non-empty geometry",
        ));
    } else {
        report.push(CheckResult::warning(
            "geometry presence",
            format!("{missing} row(s) without a usable geometry"),
        ));
    }

    let invalid = table
        .rows
        .iter()
        .filter_map(|row| row.geometry.as_ref())
        .filter(|geom| !geometry::is_structurally_valid(geom))
        .count();
    if invalid == 0 {
        report.push(CheckResult::pass(
            "structural validity",
            "all geometries structurally valid",
        ));
    } else {
        report.push(CheckResult::warning(
            "structural validity",
            format!("{invalid} structurally invalid geometry(ies)"),
        ));
    }

    let out_of_bounds = table
        .rows
        .iter()
        .filter_map(|row| row.geometry.as_ref())
        .filter(|geom| !geometry::within_wgs84_bounds(geom))
        .count();
    if out_of_bounds == 0 {
        report.push(CheckResult::pass(
            "wgs84 bounds",
            "all coordinates within lon/lat range",
        ));
    } else {
        report.push(CheckResult::warning(
            "wgs84 bounds",
            format!("{out_of_bounds} geometry(ies) outside WGS84 bounds"),
        ));
    }

    check_spatial_order(report, contents);
}

// Recompute the Hilbert keys the layout pass would assign and verify the
// rows are already in non-decreasing key order.
fn check_spatial_order(report: &mut ValidationReport, contents: &GeoParquetContents) {
    let mut extent: Option<arboretl_core::BoundingBox> = None;
    let bboxes: Vec<_> = contents
        .table
        .rows
        .iter()
        .map(|row| row.geometry.as_ref().and_then(geometry::bounding_box))
        .collect();
    for bbox in bboxes.iter().flatten() {
        match &mut extent {
            Some(e) => e.expand_box(bbox),
            None => extent = Some(*bbox),
        }
    }

    let keys: Vec<u64> = bboxes
        .iter()
        .map(|bbox| match (&extent, bbox) {
            (Some(extent), Some(bbox)) => {
                let (cx, cy) = bbox.center();
                arboretl_core::hilbert::index_for_point(extent, cx, cy)
            },
            _ => 0,
        })
        .collect();

    if keys.windows(2).all(|pair| pair[0] <= pair[1]) {
        report.push(CheckResult::pass(
            "spatial ordering",
            "rows in non-decreasing Hilbert order",
        ));
    } else {
        report.push(CheckResult::warning(
            "spatial ordering",
            "rows not in Hilbert order; file was not laid out",
        ));
    }
}
