//! Shapefile reader for tree inventory sources.
//!
//! Wraps the `shapefile` crate: shapes convert into `geo-types` geometries
//! and the accompanying dBASE records become typed attributes. Shapefiles do
//! not embed a machine-readable EPSG code, so the caller supplies the CRS
//! from the dataset descriptor.

use std::path::Path;

use arboretl_core::{AttrValue, Crs, FeatureRow, FeatureTable, InvalidGeometryPolicy};
use arboretl_shared::{FormatReadError, FormatResult, SourcePosition};
use geo_types::Geometry;
use shapefile::Shape;
use shapefile::dbase::FieldValue;

/// Read a `.shp` (plus its `.dbf`) into a feature table.
pub fn read_shapefile(
    path: &Path,
    policy: InvalidGeometryPolicy,
    crs: Crs,
) -> FormatResult<FeatureTable> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|err| {
        FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(format!("shapefile '{}'", path.display())),
        }
    })?;

    let mut table = FeatureTable::new(crs);
    let mut skipped: u64 = 0;

    for (index, result) in reader.iter_shapes_and_records().enumerate() {
        let row_number = index as u64 + 1;
        let (shape, record) = result.map_err(|err| FormatReadError::Parse {
            message: err.to_string(),
            position: Some(SourcePosition::row(row_number)),
            context: Some("shapefile".to_string()),
        })?;

        let geometry = match shape_to_geometry(shape, row_number) {
            Ok(geometry) => geometry,
            Err(err) if policy == InvalidGeometryPolicy::Skip => {
                log::warn!("skipping shape: {err}");
                skipped += 1;
                continue;
            },
            Err(err) => return Err(err),
        };

        let mut row = FeatureRow::new(geometry);
        for (name, value) in record {
            table.ensure_column(&name);
            row.attrs.insert(name, field_value_to_attr(value));
        }
        table.push(row);
    }

    if skipped > 0 {
        log::info!(
            "skipped {skipped} shape(s) in '{}' that could not be converted",
            path.display()
        );
    }
    Ok(table)
}

/// Convert one shape into a geometry. Null shapes are legitimate
/// "no geometry" markers, not errors.
pub fn shape_to_geometry(shape: Shape, row: u64) -> FormatResult<Option<Geometry<f64>>> {
    match shape {
        Shape::NullShape => Ok(None),
        shape => {
            let geometry = Geometry::<f64>::try_from(shape).map_err(|err| {
                FormatReadError::geometry_at(
                    format!("shape cannot be converted: {err}"),
                    SourcePosition::row(row),
                )
            })?;
            Ok(Some(geometry))
        },
    }
}

/// Map a dBASE field value onto an attribute value. Dates flatten to
/// ISO-8601 text.
pub fn field_value_to_attr(value: FieldValue) -> AttrValue {
    match value {
        FieldValue::Character(Some(text)) => {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                AttrValue::Null
            } else {
                AttrValue::Text(trimmed.to_string())
            }
        },
        FieldValue::Character(None) => AttrValue::Null,
        FieldValue::Numeric(Some(value)) => AttrValue::Float(value),
        FieldValue::Numeric(None) => AttrValue::Null,
        FieldValue::Float(Some(value)) => AttrValue::Float(f64::from(value)),
        FieldValue::Float(None) => AttrValue::Null,
        FieldValue::Integer(value) => AttrValue::Int(i64::from(value)),
        FieldValue::Logical(Some(value)) => AttrValue::Bool(value),
        FieldValue::Logical(None) => AttrValue::Null,
        FieldValue::Date(Some(date)) => AttrValue::Text(format!(
            "{:04}-{:02}-{:02}",
            date.year(),
            date.month(),
            date.day()
        )),
        FieldValue::Date(None) => AttrValue::Null,
        FieldValue::Currency(value) | FieldValue::Double(value) => AttrValue::Float(value),
        FieldValue::Memo(text) => AttrValue::Text(text),
        other => AttrValue::Text(format!("{other:?}")),
    }
}
