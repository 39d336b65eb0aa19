//! Format dispatch: turn a retrieved file into a [`FeatureTable`].
//!
//! The descriptor's declared `file_type` picks the reader; the file extension
//! is never trusted. Descriptors typed `Other` get one content probe before
//! the dataset is rejected as unsupported.

use std::path::Path;

use arboretl_core::{
    ConfigError, Crs, DatasetDescriptor, FeatureTable, FileType, GeometrySpec,
    InvalidGeometryPolicy,
};
use arboretl_shared::FormatReadError;

use crate::error::Result;

/// First bytes of every SQLite database file, GeoPackages included.
const SQLITE_MAGIC: &[u8] = b"SQLite format 3\0";

/// Read the file at `path` into a feature table per the descriptor.
pub async fn parse(path: &Path, descriptor: &DatasetDescriptor) -> Result<FeatureTable> {
    let policy = descriptor.on_invalid_geometry;
    let fallback_crs = descriptor.crs.unwrap_or_default();

    let table = match &descriptor.file_type {
        FileType::Csv => {
            let spec = descriptor
                .geometry_spec()?
                .ok_or_else(|| ConfigError::MissingGeometrySpec {
                    dataset: descriptor.name.clone(),
                })?;
            // Lon/lat pairs carry no unit hint, so the CRS must be declared.
            let crs = match &spec {
                GeometrySpec::LonLat { .. } => {
                    descriptor.crs.ok_or_else(|| ConfigError::MissingField {
                        dataset: descriptor.name.clone(),
                        field: "crs".to_string(),
                    })?
                },
                GeometrySpec::Wkt { .. } => fallback_crs,
            };
            arboretl_csv::read_csv(path, &spec, policy, crs)?
        },
        FileType::Json => arboretl_geojson::read_geojson(path, policy, fallback_crs)?,
        FileType::Parquet => arboretl_geoparquet::read_geoparquet(path, policy, fallback_crs)?,
        FileType::Shp => arboretl_shapefile::read_shapefile(path, policy, fallback_crs)?,
        FileType::Gpkg => arboretl_gpkg::read_gpkg(path, policy, fallback_crs).await?,
        FileType::Other(declared) => {
            probe(path, declared, policy, fallback_crs).await?
        },
    };

    log::info!(
        "[{}] parsed {} record(s) from {} source",
        descriptor.name,
        table.len(),
        descriptor.file_type.label()
    );
    Ok(table)
}

/// Content probe for descriptors whose declared type is not a known format.
///
/// Catalogue exports frequently mislabel their payload, so a container
/// signature or a JSON-looking body is given the benefit of the doubt before
/// the dataset fails as unsupported.
async fn probe(
    path: &Path,
    declared: &str,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> Result<FeatureTable> {
    let bytes = std::fs::read(path).map_err(|source| FormatReadError::Io {
        source,
        context: Some(format!("probe of '{}'", path.display())),
    })?;

    if bytes.starts_with(SQLITE_MAGIC) {
        log::debug!(
            "'{}' declared as '{declared}' but carries a SQLite signature; reading as GeoPackage",
            path.display()
        );
        return Ok(arboretl_gpkg::read_gpkg(path, policy, fallback_crs).await?);
    }

    if let Some(first) = bytes.iter().find(|b| !b.is_ascii_whitespace())
        && (*first == b'{' || *first == b'[')
    {
        log::debug!(
            "'{}' declared as '{declared}' but looks like JSON; reading as GeoJSON",
            path.display()
        );
        return Ok(arboretl_geojson::parse_geojson_bytes(
            &bytes,
            policy,
            fallback_crs,
        )?);
    }

    if path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("shp"))
    {
        log::debug!(
            "'{}' declared as '{declared}'; extension says Shapefile",
            path.display()
        );
        return Ok(arboretl_shapefile::read_shapefile(path, policy, fallback_crs)?);
    }

    Err(FormatReadError::Unsupported {
        format: declared.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use std::collections::BTreeMap;
    use std::io::Write;
    use std::path::PathBuf;

    fn descriptor(name: &str, file_type: FileType) -> DatasetDescriptor {
        DatasetDescriptor {
            name: name.to_string(),
            file_type,
            download_link: None,
            local_path: None,
            crs: None,
            wkt_column: None,
            lon_column: None,
            lat_column: None,
            column_mapping: BTreeMap::new(),
            metadata: BTreeMap::new(),
            on_invalid_geometry: InvalidGeometryPolicy::default(),
        }
    }

    fn write_temp(suffix: &str, contents: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(format!("data{suffix}"));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn csv_with_wkt_column_parses() {
        let (_dir, path) = write_temp(
            ".csv",
            b"soort,geo\nQuercus robur,POINT (5.1 52.09)\n",
        );
        let mut d = descriptor("Utrecht", FileType::Csv);
        d.wkt_column = Some("geo".to_string());

        let table = parse(&path, &d).await.unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.crs, Crs::Wgs84);
        assert!(table.rows[0].geometry.is_some());
    }

    #[tokio::test]
    async fn csv_lon_lat_without_crs_is_a_config_error() {
        let (_dir, path) = write_temp(".csv", b"x,y\n5.1,52.09\n");
        let mut d = descriptor("Utrecht", FileType::Csv);
        d.lon_column = Some("x".to_string());
        d.lat_column = Some("y".to_string());

        let err = parse(&path, &d).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::MissingField { ref field, .. }) if field == "crs"
        ));
    }

    #[tokio::test]
    async fn csv_without_geometry_spec_is_rejected() {
        let (_dir, path) = write_temp(".csv", b"soort\nTilia\n");
        let d = descriptor("Utrecht", FileType::Csv);

        let err = parse(&path, &d).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::MissingGeometrySpec { .. })
        ));
    }

    #[tokio::test]
    async fn geojson_parses_with_declared_type() {
        let (_dir, path) = write_temp(
            ".json",
            br#"{"type":"FeatureCollection","features":[
                {"type":"Feature","geometry":{"type":"Point","coordinates":[4.9,52.37]},
                 "properties":{"soort":"Ulmus"}}]}"#,
        );
        let d = descriptor("Amsterdam", FileType::Json);

        let table = parse(&path, &d).await.unwrap();
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn probe_detects_json_behind_unknown_type() {
        let (_dir, path) = write_temp(
            ".data",
            br#"  {"type":"FeatureCollection","features":[]}"#,
        );
        let d = descriptor("Almere", FileType::Other("data".to_string()));

        let table = parse(&path, &d).await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn probe_rejects_opaque_bytes() {
        let (_dir, path) = write_temp(".xlsx", b"PK\x03\x04 definitely a spreadsheet");
        let d = descriptor("Assen", FileType::Other("xlsx".to_string()));

        let err = parse(&path, &d).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Read(FormatReadError::Unsupported { ref format }) if format == "xlsx"
        ));
    }
}
