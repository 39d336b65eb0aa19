//! CSV reader for tree inventory sources.
//!
//! CSV carries no native geometry, so the dataset descriptor must say where
//! to find it: either a WKT column or a lon/lat column pair. Every other
//! column is kept as an attribute with light scalar typing.

use std::path::Path;

use arboretl_core::{
    AttrValue, Crs, FeatureRow, FeatureTable, GeometrySpec, InvalidGeometryPolicy,
};
use arboretl_shared::{FormatReadError, FormatResult, SourcePosition};
use geo_types::{Geometry, Point};
use geozero::ToGeo;
use geozero::wkt::Wkt;

/// Read a CSV file into a feature table.
///
/// `crs` is the CRS the descriptor declares for the coordinate values; CSV
/// itself cannot embed one. Rows whose geometry cell is empty come back with
/// no geometry. Rows whose geometry cell is present but unparseable follow
/// `policy`: skipped with a warning, or failing the whole read.
pub fn read_csv(
    path: &Path,
    spec: &GeometrySpec,
    policy: InvalidGeometryPolicy,
    crs: Crs,
) -> FormatResult<FeatureTable> {
    let mut reader = csv::Reader::from_path(path).map_err(map_csv_error)?;
    let headers = reader.headers().map_err(map_csv_error)?.clone();

    let geometry_columns = GeometryColumns::locate(spec, &headers)?;

    let mut table =
        FeatureTable::with_columns(crs, headers.iter().map(str::to_string).collect());
    let mut skipped: u64 = 0;

    for (index, record) in reader.records().enumerate() {
        let record = record.map_err(map_csv_error)?;
        // Data rows start at line 2; fall back to arithmetic when the parser
        // cannot report a position.
        let line = record
            .position()
            .map_or(index as u64 + 2, csv::Position::line);

        let geometry = match geometry_columns.parse(&record, line) {
            Ok(geometry) => geometry,
            Err(err) if err.is_geometry() && policy == InvalidGeometryPolicy::Skip => {
                log::warn!("skipping row: {err}");
                skipped += 1;
                continue;
            },
            Err(err) => return Err(err),
        };

        let mut row = FeatureRow::new(geometry);
        for (header, cell) in headers.iter().zip(record.iter()) {
            row.attrs
                .insert(header.to_string(), AttrValue::parse_scalar(cell));
        }
        table.push(row);
    }

    if skipped > 0 {
        log::info!(
            "skipped {skipped} row(s) with invalid geometry in '{}'",
            path.display()
        );
    }
    Ok(table)
}

/// Resolved header indices for the descriptor's geometry spec.
enum GeometryColumns {
    Wkt { column: String, index: usize },
    LonLat { lon: usize, lat: usize },
}

impl GeometryColumns {
    fn locate(spec: &GeometrySpec, headers: &csv::StringRecord) -> FormatResult<Self> {
        let find = |name: &str| -> FormatResult<usize> {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                FormatReadError::Schema {
                    message: format!("geometry column '{name}' not found in header"),
                    context: None,
                }
            })
        };

        match spec {
            GeometrySpec::Wkt { column } => Ok(GeometryColumns::Wkt {
                column: column.clone(),
                index: find(column)?,
            }),
            GeometrySpec::LonLat { lon, lat } => Ok(GeometryColumns::LonLat {
                lon: find(lon)?,
                lat: find(lat)?,
            }),
        }
    }

    fn parse(
        &self,
        record: &csv::StringRecord,
        line: u64,
    ) -> FormatResult<Option<Geometry<f64>>> {
        match self {
            GeometryColumns::Wkt { column, index } => {
                let cell = record.get(*index).unwrap_or("").trim();
                if cell.is_empty() {
                    return Ok(None);
                }
                let geometry = Wkt(cell).to_geo().map_err(|err| {
                    FormatReadError::geometry_at(
                        format!("invalid WKT: {err}"),
                        SourcePosition::row_field(line, column.clone()),
                    )
                })?;
                Ok(Some(geometry))
            },
            GeometryColumns::LonLat { lon, lat } => {
                let lon_cell = record.get(*lon).unwrap_or("").trim();
                let lat_cell = record.get(*lat).unwrap_or("").trim();
                if lon_cell.is_empty() || lat_cell.is_empty() {
                    return Ok(None);
                }
                let x = parse_coordinate(lon_cell, line)?;
                let y = parse_coordinate(lat_cell, line)?;
                Ok(Some(Point::new(x, y).into()))
            },
        }
    }
}

fn parse_coordinate(cell: &str, line: u64) -> FormatResult<f64> {
    let value: f64 = cell.parse().map_err(|_| {
        FormatReadError::geometry_at(
            format!("coordinate '{cell}' is not a number"),
            SourcePosition::row(line),
        )
    })?;
    if !value.is_finite() {
        return Err(FormatReadError::geometry_at(
            format!("coordinate '{cell}' is not finite"),
            SourcePosition::row(line),
        ));
    }
    Ok(value)
}

fn map_csv_error(err: csv::Error) -> FormatReadError {
    let message = err.to_string();
    let position = err.position().map(|p| SourcePosition::row(p.line()));
    match err.into_kind() {
        csv::ErrorKind::Io(source) => FormatReadError::Io {
            source,
            context: Some("CSV".to_string()),
        },
        _ => FormatReadError::Parse {
            message,
            position,
            context: Some("CSV".to_string()),
        },
    }
}
