//! Run configuration: dataset descriptors and the standard column template.
//!
//! A run is driven by two JSON files. The datasets file is an array of
//! [`DatasetDescriptor`] values, one per source inventory. The template file
//! is a flat JSON object whose keys are the standard column names every
//! output file must carry; [`Template`] keeps them in lexicographic order so
//! output schemas are deterministic.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::crs::Crs;
use crate::error::ConfigError;

/// Source file format declared by a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(from = "String", into = "String")]
pub enum FileType {
    /// GeoJSON (feature collection, single feature, or newline-delimited)
    Json,
    /// Delimited text with a WKT column or lon/lat columns
    Csv,
    /// GeoParquet
    Parquet,
    /// ESRI Shapefile
    Shp,
    /// OGC GeoPackage
    Gpkg,
    /// Anything else; kept verbatim so errors can name it
    Other(String),
}

impl FileType {
    /// Human-readable format name for logs and error messages.
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            FileType::Json => "GeoJSON",
            FileType::Csv => "CSV",
            FileType::Parquet => "GeoParquet",
            FileType::Shp => "Shapefile",
            FileType::Gpkg => "GeoPackage",
            FileType::Other(s) => s,
        }
    }

    /// Canonical lowercase form as written in configuration files.
    #[must_use]
    pub fn as_config_str(&self) -> &str {
        match self {
            FileType::Json => "json",
            FileType::Csv => "csv",
            FileType::Parquet => "parquet",
            FileType::Shp => "shp",
            FileType::Gpkg => "gpkg",
            FileType::Other(s) => s,
        }
    }
}

impl From<String> for FileType {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" | "geojson" => FileType::Json,
            "csv" => FileType::Csv,
            "parquet" | "geoparquet" => FileType::Parquet,
            "shp" | "shapefile" => FileType::Shp,
            "gpkg" | "geopackage" => FileType::Gpkg,
            _ => FileType::Other(value.trim().to_string()),
        }
    }
}

impl From<FileType> for String {
    fn from(value: FileType) -> Self {
        value.as_config_str().to_string()
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_config_str())
    }
}

/// How a CSV descriptor locates its geometry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeometrySpec {
    /// Geometry parsed from a WKT column
    Wkt {
        /// Source column holding WKT text
        column: String,
    },
    /// Point geometry built from two numeric columns
    LonLat {
        /// Source column holding the x / longitude value
        lon: String,
        /// Source column holding the y / latitude value
        lat: String,
    },
}

/// What to do with a row whose geometry cannot be parsed or is structurally
/// broken.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidGeometryPolicy {
    /// Drop the offending row, log it, and continue
    Skip,
    /// Fail the dataset on the first offending row
    #[default]
    Abort,
}

/// One source dataset in the run configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatasetDescriptor {
    /// Dataset name; doubles as the output directory and file stem
    pub name: String,
    /// Declared source format
    pub file_type: FileType,
    /// HTTP(S) URL the source can be fetched from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_link: Option<String>,
    /// Path to an already-downloaded copy; takes precedence over the link
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    /// Source CRS override; containers that embed a CRS win over this
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crs: Option<Crs>,
    /// CSV only: column holding WKT geometry text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkt_column: Option<String>,
    /// CSV only: column holding the x / longitude value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon_column: Option<String>,
    /// CSV only: column holding the y / latitude value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat_column: Option<String>,
    /// Standard field name -> source column name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub column_mapping: BTreeMap<String, String>,
    /// Constant columns stamped onto every row (owner, source date, ...)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
    /// Row policy for unparseable or structurally invalid geometries
    #[serde(default)]
    pub on_invalid_geometry: InvalidGeometryPolicy,
}

impl DatasetDescriptor {
    /// Resolve the CSV geometry columns into a [`GeometrySpec`].
    ///
    /// `Ok(None)` means no spec was declared, which is fine for formats with
    /// native geometry and an error for CSV (checked in [`validate`]).
    ///
    /// [`validate`]: DatasetDescriptor::validate
    pub fn geometry_spec(&self) -> Result<Option<GeometrySpec>, ConfigError> {
        match (&self.wkt_column, &self.lon_column, &self.lat_column) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) => {
                Err(ConfigError::AmbiguousGeometrySpec {
                    dataset: self.name.clone(),
                })
            },
            (Some(column), None, None) => Ok(Some(GeometrySpec::Wkt {
                column: column.clone(),
            })),
            (None, Some(lon), Some(lat)) => Ok(Some(GeometrySpec::LonLat {
                lon: lon.clone(),
                lat: lat.clone(),
            })),
            (None, Some(_), None) => Err(ConfigError::MissingField {
                dataset: self.name.clone(),
                field: "lat_column".to_string(),
            }),
            (None, None, Some(_)) => Err(ConfigError::MissingField {
                dataset: self.name.clone(),
                field: "lon_column".to_string(),
            }),
            (None, None, None) => Ok(None),
        }
    }

    /// Check the descriptor for internal consistency against the template.
    ///
    /// These errors are dataset-scoped: the run skips the descriptor and
    /// carries on with the rest.
    pub fn validate(&self, template: &Template) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidField {
                dataset: self.name.clone(),
                field: "name".to_string(),
                message: "name must not be empty".to_string(),
            });
        }
        if self.download_link.is_none() && self.local_path.is_none() {
            return Err(ConfigError::NoSource {
                dataset: self.name.clone(),
            });
        }
        if let Some(link) = &self.download_link
            && link.trim().is_empty()
        {
            return Err(ConfigError::InvalidField {
                dataset: self.name.clone(),
                field: "download_link".to_string(),
                message: "download link must not be empty".to_string(),
            });
        }

        let spec = self.geometry_spec()?;
        if self.file_type == FileType::Csv && spec.is_none() {
            return Err(ConfigError::MissingGeometrySpec {
                dataset: self.name.clone(),
            });
        }

        for standard_field in self.column_mapping.keys() {
            if !template.contains(standard_field) {
                return Err(ConfigError::UnknownStandardField {
                    dataset: self.name.clone(),
                    field: standard_field.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The standard column set shared by every output file.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct Template {
    // BTreeMap keeps field order lexicographic and therefore stable.
    fields: BTreeMap<String, String>,
}

impl Template {
    /// Build a template from (name, description) pairs. Mostly for tests.
    pub fn from_fields<I>(fields: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        Self {
            fields: fields.into_iter().collect(),
        }
    }

    /// Standard field names in lexicographic order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Whether `name` is one of the standard fields.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Number of standard fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the template declares no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Load and sanity-check the dataset descriptors file.
pub fn load_descriptors(path: &Path) -> Result<Vec<DatasetDescriptor>, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    let descriptors: Vec<DatasetDescriptor> =
        serde_json::from_str(&raw).map_err(|source| ConfigError::Unparseable {
            path: path.to_path_buf(),
            source,
        })?;

    let mut seen = HashSet::new();
    for descriptor in &descriptors {
        if !seen.insert(descriptor.name.as_str()) {
            return Err(ConfigError::DuplicateName {
                name: descriptor.name.clone(),
            });
        }
    }
    Ok(descriptors)
}

/// Load the standard column template file.
pub fn load_template(path: &Path) -> Result<Template, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Unreadable {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ConfigError::Unparseable {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn template() -> Template {
        Template::from_fields([
            ("boomhoogte".to_string(), "tree height class".to_string()),
            ("naam".to_string(), "species name".to_string()),
            ("plantjaar".to_string(), "year planted".to_string()),
        ])
    }

    fn descriptor(name: &str) -> DatasetDescriptor {
        DatasetDescriptor {
            name: name.to_string(),
            file_type: FileType::Json,
            download_link: Some("https://example.org/trees.json".to_string()),
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

    #[test]
    fn file_types_parse_case_insensitively() {
        assert_eq!(FileType::from("GeoJSON".to_string()), FileType::Json);
        assert_eq!(FileType::from("CSV".to_string()), FileType::Csv);
        assert_eq!(FileType::from(" gpkg ".to_string()), FileType::Gpkg);
        assert_eq!(FileType::from("Shapefile".to_string()), FileType::Shp);
        assert_eq!(
            FileType::from("xlsx".to_string()),
            FileType::Other("xlsx".to_string())
        );
    }

    #[test]
    fn file_type_round_trips_through_config_form() {
        for raw in ["json", "csv", "parquet", "shp", "gpkg"] {
            let parsed = FileType::from(raw.to_string());
            assert_eq!(parsed.as_config_str(), raw);
        }
    }

    #[test]
    fn descriptors_parse_from_json() {
        let raw = r#"[{
            "name": "Utrecht",
            "file_type": "CSV",
            "download_link": "https://example.org/utrecht.csv",
            "crs": "EPSG:28992",
            "lon_column": "X",
            "lat_column": "Y",
            "column_mapping": {"naam": "Soortnaam"},
            "metadata": {"eigenaar": "Gemeente Utrecht"},
            "on_invalid_geometry": "skip"
        }]"#;
        let descriptors: Vec<DatasetDescriptor> = serde_json::from_str(raw).unwrap();
        let d = &descriptors[0];
        assert_eq!(d.name, "Utrecht");
        assert_eq!(d.file_type, FileType::Csv);
        assert_eq!(d.crs, Some(Crs::RdNew));
        assert_eq!(d.on_invalid_geometry, InvalidGeometryPolicy::Skip);
        assert_eq!(
            d.geometry_spec().unwrap(),
            Some(GeometrySpec::LonLat {
                lon: "X".to_string(),
                lat: "Y".to_string(),
            })
        );
        assert!(d.validate(&template()).is_ok());
    }

    #[test]
    fn invalid_geometry_policy_defaults_to_abort() {
        let raw = r#"{"name": "A", "file_type": "json", "local_path": "a.json"}"#;
        let d: DatasetDescriptor = serde_json::from_str(raw).unwrap();
        assert_eq!(d.on_invalid_geometry, InvalidGeometryPolicy::Abort);
    }

    #[test]
    fn both_geometry_specs_is_ambiguous() {
        let mut d = descriptor("Arnhem");
        d.file_type = FileType::Csv;
        d.wkt_column = Some("geo".to_string());
        d.lon_column = Some("x".to_string());
        d.lat_column = Some("y".to_string());
        assert!(matches!(
            d.geometry_spec(),
            Err(ConfigError::AmbiguousGeometrySpec { .. })
        ));
    }

    #[test]
    fn lone_lon_column_is_missing_its_partner() {
        let mut d = descriptor("Arnhem");
        d.lon_column = Some("x".to_string());
        let err = d.geometry_spec().unwrap_err();
        assert!(err.to_string().contains("lat_column"));
    }

    #[test]
    fn csv_requires_a_geometry_spec() {
        let mut d = descriptor("Breda");
        d.file_type = FileType::Csv;
        assert!(matches!(
            d.validate(&template()),
            Err(ConfigError::MissingGeometrySpec { .. })
        ));
    }

    #[test]
    fn sourceless_descriptor_is_rejected() {
        let mut d = descriptor("Delft");
        d.download_link = None;
        assert!(matches!(
            d.validate(&template()),
            Err(ConfigError::NoSource { .. })
        ));
    }

    #[test]
    fn mapping_keys_must_be_standard_fields() {
        let mut d = descriptor("Ede");
        d.column_mapping
            .insert("hoogte".to_string(), "HEIGHT".to_string());
        let err = d.validate(&template()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownStandardField { .. }));
        assert!(err.to_string().contains("hoogte"));
    }

    #[test]
    fn template_fields_come_out_sorted() {
        let raw = r#"{"plantjaar": "", "boomhoogte": "", "naam": ""}"#;
        let template: Template = serde_json::from_str(raw).unwrap();
        let names: Vec<&str> = template.field_names().collect();
        assert_eq!(names, ["boomhoogte", "naam", "plantjaar"]);
    }

    #[test]
    fn load_descriptors_rejects_duplicate_names() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"name": "Gouda", "file_type": "json", "local_path": "a.json"}},
                {{"name": "Gouda", "file_type": "csv", "local_path": "b.csv"}}
            ]"#
        )
        .unwrap();
        let err = load_descriptors(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateName { .. }));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn load_descriptors_reports_missing_file() {
        let err = load_descriptors(Path::new("/nonexistent/datasets.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
        assert!(err.is_run_fatal());
    }

    #[test]
    fn load_template_reads_json_object() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"naam": "species name", "plantjaar": "year"}}"#).unwrap();
        let template = load_template(file.path()).unwrap();
        assert_eq!(template.len(), 2);
        assert!(template.contains("naam"));
        assert!(!template.contains("geometry"));
    }
}
