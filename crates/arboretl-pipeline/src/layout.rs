//! Physical layout: spatially sort a written GeoParquet file and attach the
//! per-row bbox column.
//!
//! Runs against the file rather than the in-memory table so it can re-layout
//! any GeoParquet artifact, including one it produced earlier. The sort key
//! is the Hilbert curve distance of each row's bbox center over the dataset
//! extent; the sort is stable, so applying the pass twice yields the same
//! byte order.

use std::path::Path;

use arboretl_core::{
    BoundingBox, FeatureRow, InvalidGeometryPolicy, geometry, hilbert,
};
use arboretl_geoparquet::WriteOptions;

use crate::error::Result;

/// Outcome of a layout pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutSummary {
    /// Rows in the rewritten file
    pub rows: usize,
    /// Union extent of all geometries, `None` for an empty file
    pub extent: Option<BoundingBox>,
}

/// Rewrite the GeoParquet file at `path` in Hilbert order with a bbox column.
pub fn apply(path: &Path, options: &WriteOptions) -> Result<LayoutSummary> {
    // The file is ours: broken geometry at this point is a bug, not input.
    let mut table = arboretl_geoparquet::read_geoparquet(
        path,
        InvalidGeometryPolicy::Abort,
        arboretl_core::Crs::Wgs84,
    )?;

    let bboxes: Vec<Option<BoundingBox>> = table
        .rows
        .iter()
        .map(|row| row.geometry.as_ref().and_then(geometry::bounding_box))
        .collect();

    let mut extent: Option<BoundingBox> = None;
    for bbox in bboxes.iter().flatten() {
        match &mut extent {
            Some(e) => e.expand_box(bbox),
            None => extent = Some(*bbox),
        }
    }

    let mut keyed: Vec<(u64, Option<BoundingBox>, FeatureRow)> = bboxes
        .into_iter()
        .zip(std::mem::take(&mut table.rows))
        .map(|(bbox, row)| {
            let key = match (&extent, &bbox) {
                (Some(extent), Some(bbox)) => {
                    let (cx, cy) = bbox.center();
                    hilbert::index_for_point(extent, cx, cy)
                },
                // Rows without a geometry sort ahead of everything, stably.
                _ => 0,
            };
            (key, bbox, row)
        })
        .collect();
    keyed.sort_by_key(|(key, _, _)| *key);

    let mut sorted_bboxes = Vec::with_capacity(keyed.len());
    for (_, bbox, row) in keyed {
        sorted_bboxes.push(bbox);
        table.rows.push(row);
    }

    arboretl_geoparquet::write_geoparquet(path, &table, Some(&sorted_bboxes), options)?;

    let summary = LayoutSummary {
        rows: table.len(),
        extent,
    };
    log::debug!(
        "laid out {} row(s) in '{}' in Hilbert order",
        summary.rows,
        path.display()
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use arboretl_core::{AttrValue, Crs, FeatureTable};
    use geo_types::Point;

    fn write_points(points: &[(i64, f64, f64)]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bomen.parquet");
        let mut table = FeatureTable::with_columns(Crs::Wgs84, vec!["id".to_string()]);
        for (id, x, y) in points {
            table.push(FeatureRow::new(Some(Point::new(*x, *y).into())).with_attr("id", *id));
        }
        arboretl_geoparquet::write_geoparquet(&path, &table, None, &WriteOptions::default())
            .unwrap();
        (dir, path)
    }

    fn ids(path: &Path) -> Vec<i64> {
        let table = arboretl_geoparquet::read_geoparquet(
            path,
            InvalidGeometryPolicy::Abort,
            Crs::Wgs84,
        )
        .unwrap();
        table
            .rows
            .iter()
            .map(|row| match row.attr("id") {
                Some(AttrValue::Int(id)) => *id,
                other => panic!("unexpected id cell {other:?}"),
            })
            .collect()
    }

    #[test]
    fn rows_come_out_in_hilbert_order() {
        // Four corners of a square; curve order at the corners is
        // (min,min) -> (min,max) -> (max,max) -> (max,min).
        let (_dir, path) = write_points(&[
            (3, 10.0, 0.0),
            (1, 0.0, 10.0),
            (0, 0.0, 0.0),
            (2, 10.0, 10.0),
        ]);

        let summary = apply(&path, &WriteOptions::default()).unwrap();

        assert_eq!(summary.rows, 4);
        assert_eq!(summary.extent, Some(BoundingBox::new(0.0, 0.0, 10.0, 10.0)));
        assert_eq!(ids(&path), [0, 1, 2, 3]);
    }

    #[test]
    fn layout_is_idempotent() {
        let (_dir, path) = write_points(&[
            (2, 5.2, 52.4),
            (0, 4.3, 51.9),
            (1, 4.9, 52.1),
        ]);

        apply(&path, &WriteOptions::default()).unwrap();
        let first = std::fs::read(&path).unwrap();
        apply(&path, &WriteOptions::default()).unwrap();
        let second = std::fs::read(&path).unwrap();

        assert_eq!(first, second);
    }

    #[test]
    fn bbox_column_is_attached() {
        let (_dir, path) = write_points(&[(0, 4.9, 52.37)]);

        apply(&path, &WriteOptions::default()).unwrap();

        let contents = arboretl_geoparquet::read_geoparquet_full(
            &path,
            InvalidGeometryPolicy::Abort,
            Crs::Wgs84,
        )
        .unwrap();
        assert!(contents.had_bbox_column);
        assert_eq!(
            contents.bboxes,
            vec![Some(BoundingBox::from_point(4.9, 52.37))]
        );
    }

    #[test]
    fn empty_file_lays_out_without_extent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("leeg.parquet");
        let table = FeatureTable::with_columns(Crs::Wgs84, vec!["id".to_string()]);
        arboretl_geoparquet::write_geoparquet(&path, &table, None, &WriteOptions::default())
            .unwrap();

        let summary = apply(&path, &WriteOptions::default()).unwrap();

        assert_eq!(summary, LayoutSummary { rows: 0, extent: None });
    }

    #[test]
    fn single_point_dataset_has_degenerate_extent() {
        let (_dir, path) = write_points(&[(0, 5.0, 52.0)]);

        let summary = apply(&path, &WriteOptions::default()).unwrap();

        assert_eq!(summary.extent, Some(BoundingBox::from_point(5.0, 52.0)));
        assert_eq!(ids(&path), [0]);
    }
}
