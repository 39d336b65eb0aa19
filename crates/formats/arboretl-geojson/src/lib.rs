//! `GeoJSON` reader for tree inventory sources.
#![allow(clippy::result_large_err)]

use std::convert::TryInto;
use std::io::Cursor;
use std::path::Path;

use arboretl_core::{AttrValue, Crs, FeatureRow, FeatureTable, InvalidGeometryPolicy};
use arboretl_shared::{FormatReadError, FormatResult, SourcePosition};
use geo_types::Geometry;
use geojson::{Feature, GeoJson, JsonObject, JsonValue};

/// Read a `GeoJSON` file into a feature table.
///
/// Accepts a `FeatureCollection`, a single `Feature`, a bare geometry, or a
/// newline-delimited sequence of any of those. Coordinates are assumed to be
/// in `fallback_crs` unless the file carries a legacy `crs` member naming
/// something else.
pub fn read_geojson(
    path: &Path,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<FeatureTable> {
    let bytes = std::fs::read(path).map_err(|source| FormatReadError::Io {
        source,
        context: Some(format!("GeoJSON file '{}'", path.display())),
    })?;
    parse_geojson_bytes(&bytes, policy, fallback_crs)
}

/// Parse raw bytes into a feature table.
pub fn parse_geojson_bytes(
    bytes: &[u8],
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<FeatureTable> {
    match GeoJson::from_reader(Cursor::new(bytes)) {
        Ok(geojson) => {
            let (named_crs, features) = collect_features(geojson)?;
            assemble(features, named_crs.unwrap_or(fallback_crs), policy)
        },
        Err(primary_err) => {
            let primary_err_message = primary_err.to_string();
            match parse_feature_sequence(bytes, policy, fallback_crs) {
                Ok(table) => Ok(table),
                Err(sequence_err) => {
                    Err(combine_errors(&primary_err_message, &sequence_err))
                },
            }
        },
    }
}

/// Flatten one `GeoJson` document into features, picking up a legacy
/// collection-level `crs` member when present.
fn collect_features(geojson: GeoJson) -> FormatResult<(Option<Crs>, Vec<Feature>)> {
    match geojson {
        GeoJson::FeatureCollection(collection) => {
            let crs = named_crs(collection.foreign_members.as_ref())?;
            Ok((crs, collection.features))
        },
        GeoJson::Feature(feature) => Ok((None, vec![feature])),
        GeoJson::Geometry(geometry) => Ok((
            None,
            vec![Feature {
                bbox: None,
                geometry: Some(geometry),
                id: None,
                properties: None,
                foreign_members: None,
            }],
        )),
    }
}

fn assemble(
    features: Vec<Feature>,
    crs: Crs,
    policy: InvalidGeometryPolicy,
) -> FormatResult<FeatureTable> {
    let mut table = FeatureTable::new(crs);
    let mut skipped: u64 = 0;

    for (index, feature) in features.into_iter().enumerate() {
        let position = index as u64 + 1;
        let geometry = match feature.geometry {
            Some(geometry) => match convert_geometry(geometry, position) {
                Ok(geometry) => Some(geometry),
                Err(err) if policy == InvalidGeometryPolicy::Skip => {
                    log::warn!("skipping feature: {err}");
                    skipped += 1;
                    continue;
                },
                Err(err) => return Err(err),
            },
            None => None,
        };

        let mut row = FeatureRow::new(geometry);
        if let Some(properties) = feature.properties {
            for (key, value) in properties {
                table.ensure_column(&key);
                row.attrs.insert(key, AttrValue::from_json(&value));
            }
        }
        table.push(row);
    }

    if skipped > 0 {
        log::info!("skipped {skipped} feature(s) with invalid geometry");
    }
    Ok(table)
}

fn convert_geometry(
    geometry: geojson::Geometry,
    position: u64,
) -> FormatResult<Geometry<f64>> {
    check_positions(&geometry.value, position)?;
    geometry.try_into().map_err(|err| {
        FormatReadError::geometry_at(
            format!("invalid GeoJSON geometry: {err}"),
            SourcePosition::row(position),
        )
    })
}

// The geo-types conversion assumes every position array holds at least x
// and y; broken exports do ship shorter ones.
fn check_positions(value: &geojson::Value, position: u64) -> FormatResult<()> {
    let bad = |len: usize| {
        FormatReadError::geometry_at(
            format!("coordinate position has {len} value(s), need at least 2"),
            SourcePosition::row(position),
        )
    };
    let check_one = |p: &Vec<f64>| if p.len() < 2 { Err(bad(p.len())) } else { Ok(()) };

    match value {
        geojson::Value::Point(p) => check_one(p)?,
        geojson::Value::MultiPoint(ps) | geojson::Value::LineString(ps) => {
            for p in ps {
                check_one(p)?;
            }
        },
        geojson::Value::MultiLineString(lines) | geojson::Value::Polygon(lines) => {
            for line in lines {
                for p in line {
                    check_one(p)?;
                }
            }
        },
        geojson::Value::MultiPolygon(polygons) => {
            for polygon in polygons {
                for ring in polygon {
                    for p in ring {
                        check_one(p)?;
                    }
                }
            }
        },
        geojson::Value::GeometryCollection(geometries) => {
            for geometry in geometries {
                check_positions(&geometry.value, position)?;
            }
        },
    }
    Ok(())
}

/// Parse a newline-delimited sequence of GeoJSON documents.
fn parse_feature_sequence(
    bytes: &[u8],
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<FeatureTable> {
    let mut features = Vec::new();
    let mut named: Option<Crs> = None;

    for (line_idx, raw_line) in bytes.split(|b| *b == b'\n').enumerate() {
        let line_number = (line_idx + 1) as u64;
        let line = std::str::from_utf8(raw_line).map_err(|err| FormatReadError::Parse {
            message: format!("GeoJSON line is not valid UTF-8: {err}"),
            position: Some(SourcePosition::row(line_number)),
            context: Some("GeoJSON sequence".to_string()),
        })?;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let geojson = line
            .parse::<GeoJson>()
            .map_err(|err| FormatReadError::Parse {
                message: format!("failed to parse GeoJSON document: {err}"),
                position: Some(SourcePosition::row(line_number)),
                context: Some("GeoJSON sequence".to_string()),
            })?;

        let (line_crs, mut line_features) = collect_features(geojson)?;
        if named.is_none() {
            named = line_crs;
        }
        features.append(&mut line_features);
    }

    if features.is_empty() {
        return Err(FormatReadError::Parse {
            message: "no GeoJSON features found".to_string(),
            position: None,
            context: Some("GeoJSON sequence".to_string()),
        });
    }
    assemble(features, named.unwrap_or(fallback_crs), policy)
}

/// Extract a legacy named CRS, e.g.
/// `{"type": "name", "properties": {"name": "urn:ogc:def:crs:EPSG::28992"}}`.
fn named_crs(foreign_members: Option<&JsonObject>) -> FormatResult<Option<Crs>> {
    let Some(value) = foreign_members.and_then(|members| members.get("crs")) else {
        return Ok(None);
    };
    let Some(name) = value.pointer("/properties/name").and_then(JsonValue::as_str) else {
        return Err(FormatReadError::Parse {
            message: "crs member has no properties.name".to_string(),
            position: None,
            context: Some("GeoJSON".to_string()),
        });
    };
    let crs = name.parse::<Crs>().map_err(|err| FormatReadError::Parse {
        message: err.to_string(),
        position: None,
        context: Some("GeoJSON".to_string()),
    })?;
    Ok(Some(crs))
}

fn combine_errors(collection_err: &str, sequence_err: &FormatReadError) -> FormatReadError {
    FormatReadError::Parse {
        message: format!(
            "failed to parse as a GeoJSON document ({collection_err}); \
             also failed to parse as a GeoJSON sequence: {sequence_err}"
        ),
        position: None,
        context: Some("GeoJSON".to_string()),
    }
}
