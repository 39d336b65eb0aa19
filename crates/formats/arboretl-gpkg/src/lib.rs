//! GeoPackage reader for tree inventory sources.
//!
//! A GeoPackage is a SQLite database with a registry of feature layers in
//! `gpkg_contents` and the geometry column and SRS per layer in
//! `gpkg_geometry_columns`. Geometry blobs carry a `GP` header (flags, SRS
//! id, optional envelope) in front of plain WKB.
//!
//! All feature layers are read and concatenated; the attribute column set is
//! the union across layers.

use std::path::Path;

use arboretl_core::{AttrValue, Crs, FeatureRow, FeatureTable, InvalidGeometryPolicy};
use arboretl_shared::{FormatReadError, FormatResult, SourcePosition};
use geo_types::Geometry;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Row, TypeInfo, ValueRef};

/// Read every feature layer of a GeoPackage into one feature table.
///
/// `fallback_crs` is used when a layer's `srs_id` is 0 or -1 (undefined per
/// the GeoPackage spec). Layers that name different CRSs fail the read.
pub async fn read_gpkg(
    path: &Path,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<FeatureTable> {
    let context = format!("GeoPackage '{}'", path.display());
    let mut conn = SqliteConnectOptions::new()
        .filename(path)
        .read_only(true)
        .connect()
        .await
        .map_err(|err| map_sqlx(err, &context))?;

    let result = read_all_layers(&mut conn, policy, fallback_crs, &context).await;
    // Close errors are not worth failing a successful read over.
    if let Err(err) = conn.close().await {
        log::debug!("closing {context}: {err}");
    }
    result
}

async fn read_all_layers(
    conn: &mut SqliteConnection,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
    context: &str,
) -> FormatResult<FeatureTable> {
    let layers = sqlx::query(
        "SELECT table_name FROM gpkg_contents WHERE data_type = 'features' ORDER BY table_name",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(|err| map_sqlx(err, context))?;

    if layers.is_empty() {
        return Err(FormatReadError::Schema {
            message: "no feature layers registered in gpkg_contents".to_string(),
            context: Some(context.to_string()),
        });
    }

    let mut table: Option<FeatureTable> = None;
    for layer_row in &layers {
        let layer: String = layer_row
            .try_get("table_name")
            .map_err(|err| map_sqlx(err, context))?;

        let geometry_info = sqlx::query(
            "SELECT column_name, srs_id FROM gpkg_geometry_columns WHERE table_name = ?1",
        )
        .bind(&layer)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|err| map_sqlx(err, context))?;

        let Some(geometry_info) = geometry_info else {
            return Err(FormatReadError::Schema {
                message: format!("layer '{layer}' is missing from gpkg_geometry_columns"),
                context: Some(context.to_string()),
            });
        };
        let geometry_column: String = geometry_info
            .try_get("column_name")
            .map_err(|err| map_sqlx(err, context))?;
        let srs_id: i64 = geometry_info
            .try_get("srs_id")
            .map_err(|err| map_sqlx(err, context))?;
        let layer_crs = crs_from_srs_id(srs_id, fallback_crs, &layer)?;

        if let Some(existing) = &table
            && existing.crs != layer_crs
        {
            return Err(FormatReadError::Schema {
                message: format!(
                    "layers disagree on CRS: {} vs {} in layer '{layer}'",
                    existing.crs, layer_crs
                ),
                context: Some(context.to_string()),
            });
        }
        let table = table.get_or_insert_with(|| FeatureTable::new(layer_crs));

        read_layer(conn, table, &layer, &geometry_column, policy, context).await?;
    }

    Ok(table.unwrap_or_else(|| FeatureTable::new(fallback_crs)))
}

async fn read_layer(
    conn: &mut SqliteConnection,
    table: &mut FeatureTable,
    layer: &str,
    geometry_column: &str,
    policy: InvalidGeometryPolicy,
    context: &str,
) -> FormatResult<()> {
    // Identifiers cannot be bound as parameters; quote and escape instead.
    let sql = format!(r#"SELECT * FROM "{}""#, layer.replace('"', "\"\""));
    let rows = sqlx::query(&sql)
        .fetch_all(&mut *conn)
        .await
        .map_err(|err| map_sqlx(err, context))?;

    let mut skipped: u64 = 0;
    for (index, row) in rows.iter().enumerate() {
        let position = SourcePosition::row(index as u64 + 1).in_layer(layer);

        let blob: Option<Vec<u8>> = row
            .try_get(geometry_column)
            .map_err(|err| map_sqlx(err, context))?;
        let geometry = match blob {
            Some(blob) => match decode_gpkg_geometry(&blob, position) {
                Ok(geometry) => geometry,
                Err(err) if policy == InvalidGeometryPolicy::Skip => {
                    log::warn!("skipping feature: {err}");
                    skipped += 1;
                    continue;
                },
                Err(err) => return Err(err),
            },
            None => None,
        };

        let mut feature = FeatureRow::new(geometry);
        for (column_index, column) in row.columns().iter().enumerate() {
            let name = column.name();
            if name == geometry_column {
                continue;
            }
            table.ensure_column(name);
            feature
                .attrs
                .insert(name.to_string(), decode_attr(row, column_index));
        }
        table.push(feature);
    }

    if skipped > 0 {
        log::info!("skipped {skipped} feature(s) with invalid geometry in layer '{layer}'");
    }
    log::debug!("layer '{layer}': {} feature(s)", rows.len());
    Ok(())
}

/// Decode one `GeoPackageBinary` blob into a geometry.
///
/// Returns `Ok(None)` when the header's empty-geometry flag is set.
pub fn decode_gpkg_geometry(
    data: &[u8],
    position: SourcePosition,
) -> FormatResult<Option<Geometry<f64>>> {
    if data.len() < 8 || data[0] != 0x47 || data[1] != 0x50 {
        return Err(FormatReadError::geometry_at(
            "missing GeoPackage geometry header",
            position,
        ));
    }

    let flags = data[3];
    if flags & 0b0010_0000 != 0 {
        return Err(FormatReadError::geometry_at(
            "extended GeoPackage geometry encoding is not supported",
            position,
        ));
    }
    if flags & 0b0001_0000 != 0 {
        return Ok(None);
    }

    let envelope_len = match (flags >> 1) & 0x07 {
        0 => 0,
        1 => 32,
        2 | 3 => 48,
        4 => 64,
        other => {
            return Err(FormatReadError::geometry_at(
                format!("invalid envelope indicator {other}"),
                position,
            ));
        },
    };

    let wkb = match data.get(8 + envelope_len..) {
        Some(wkb) if !wkb.is_empty() => wkb,
        _ => {
            return Err(FormatReadError::geometry_at(
                "geometry blob is truncated",
                position,
            ));
        },
    };

    let geometry = Wkb(wkb).to_geo().map_err(|err| {
        FormatReadError::geometry_at(format!("invalid WKB: {err}"), position.clone())
    })?;
    Ok(Some(geometry))
}

/// Encode a geometry as a `GeoPackageBinary` blob (little-endian header, no
/// envelope). The counterpart of [`decode_gpkg_geometry`], used to build
/// fixtures.
pub fn encode_gpkg_geometry(geometry: &Geometry<f64>, srs_id: i32) -> FormatResult<Vec<u8>> {
    let wkb = geometry
        .to_wkb(CoordDimensions::xy())
        .map_err(|err| FormatReadError::Other {
            message: format!("WKB encoding failed: {err}"),
        })?;

    let mut data = Vec::with_capacity(8 + wkb.len());
    data.extend_from_slice(b"GP");
    data.push(0);
    data.push(0b0000_0001);
    data.extend_from_slice(&srs_id.to_le_bytes());
    data.extend_from_slice(&wkb);
    Ok(data)
}

fn crs_from_srs_id(srs_id: i64, fallback: Crs, layer: &str) -> FormatResult<Crs> {
    // 0 (undefined geographic) and -1 (undefined cartesian) defer to the
    // descriptor.
    if srs_id <= 0 {
        return Ok(fallback);
    }
    let code = u32::try_from(srs_id).map_err(|_| FormatReadError::Schema {
        message: format!("layer '{layer}' has nonsensical srs_id {srs_id}"),
        context: None,
    })?;
    Crs::from_epsg(code).map_err(|err| FormatReadError::Schema {
        message: format!("layer '{layer}': {err}"),
        context: None,
    })
}

fn decode_attr(row: &SqliteRow, index: usize) -> AttrValue {
    let Ok(raw) = row.try_get_raw(index) else {
        return AttrValue::Null;
    };
    if raw.is_null() {
        return AttrValue::Null;
    }
    let type_name = raw.type_info().name().to_string();

    match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => row
            .try_get::<i64, _>(index)
            .map(AttrValue::Int)
            .unwrap_or(AttrValue::Null),
        "REAL" => row
            .try_get::<f64, _>(index)
            .map(AttrValue::Float)
            .unwrap_or(AttrValue::Null),
        // Non-geometry blobs have no tabular representation.
        "BLOB" => AttrValue::Null,
        _ => row
            .try_get::<String, _>(index)
            .map(AttrValue::Text)
            .unwrap_or(AttrValue::Null),
    }
}

fn map_sqlx(err: sqlx::Error, context: &str) -> FormatReadError {
    match err {
        sqlx::Error::Io(source) => FormatReadError::Io {
            source,
            context: Some(context.to_string()),
        },
        err => FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(context.to_string()),
        },
    }
}
