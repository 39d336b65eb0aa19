//! The in-flight table of features a dataset pipeline passes between stages.
//!
//! Every parser produces a [`FeatureTable`]; the standardizer and spatial
//! normalizer mutate it in place; the layout engine and validator consume it.
//! Geometry is structural (one optional geometry per row) rather than an
//! attribute column, so stages never have to guess which column is spatial.

use std::collections::HashMap;
use std::fmt;

use geo_types::Geometry;

use crate::crs::Crs;

/// Canonical name of the geometry column in serialized output.
pub const GEOMETRY_COLUMN: &str = "geometry";

/// Explicit sentinel written into standard fields the source does not provide.
///
/// Deliberately not null: downstream consumers get a uniform, fully populated
/// schema across all datasets.
pub const MISSING_VALUE: &str = "N/A";

/// A scalar attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// Absent or empty value
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl AttrValue {
    /// Light scalar typing for tabular text cells: empty -> null, integer,
    /// float, everything else text. Cells are trimmed first.
    #[must_use]
    pub fn parse_scalar(raw: &str) -> AttrValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return AttrValue::Null;
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return AttrValue::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return AttrValue::Float(f);
        }
        AttrValue::Text(trimmed.to_string())
    }

    /// Convert a JSON property value. Nested arrays/objects are carried as
    /// their JSON text so no source information is lost.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> AttrValue {
        match value {
            serde_json::Value::Null => AttrValue::Null,
            serde_json::Value::Bool(b) => AttrValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    AttrValue::Int(i)
                } else {
                    AttrValue::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            },
            serde_json::Value::String(s) => AttrValue::Text(s.clone()),
            other => AttrValue::Text(other.to_string()),
        }
    }

    /// Returns true for [`AttrValue::Null`].
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Null => Ok(()),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Int(i) => write!(f, "{i}"),
            AttrValue::Float(v) => write!(f, "{v}"),
            AttrValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Text(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Text(s)
    }
}

impl From<i64> for AttrValue {
    fn from(i: i64) -> Self {
        AttrValue::Int(i)
    }
}

impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        AttrValue::Float(v)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

/// One feature: an optional geometry plus its attribute values.
#[derive(Debug, Clone, Default)]
pub struct FeatureRow {
    /// The feature geometry; `None` when the source row has no usable geometry
    pub geometry: Option<Geometry<f64>>,
    /// Attribute values keyed by column name
    pub attrs: HashMap<String, AttrValue>,
}

impl FeatureRow {
    /// Row with a geometry and no attributes.
    #[must_use]
    pub fn new(geometry: Option<Geometry<f64>>) -> Self {
        Self {
            geometry,
            attrs: HashMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    #[must_use]
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    /// Look up an attribute value.
    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&AttrValue> {
        self.attrs.get(name)
    }
}

/// The per-dataset table: ordered attribute columns, rows, and the CRS the
/// geometries are currently expressed in.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    /// Attribute column names in output order (geometry is not listed here)
    pub columns: Vec<String>,
    /// The feature rows
    pub rows: Vec<FeatureRow>,
    /// CRS of all geometries in the table
    pub crs: Crs,
}

impl FeatureTable {
    /// Empty table in the given CRS.
    #[must_use]
    pub fn new(crs: Crs) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            crs,
        }
    }

    /// Empty table with a known column order.
    #[must_use]
    pub fn with_columns(crs: Crs, columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
            crs,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Append the column name if it is not present yet, preserving the order
    /// in which columns were first seen (row-union across container layers).
    pub fn ensure_column(&mut self, name: &str) {
        if !self.columns.iter().any(|c| c == name) {
            self.columns.push(name.to_string());
        }
    }

    /// Append a row.
    pub fn push(&mut self, row: FeatureRow) {
        self.rows.push(row);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::Point;

    #[test]
    fn scalar_parsing_types_cells() {
        assert_eq!(AttrValue::parse_scalar(""), AttrValue::Null);
        assert_eq!(AttrValue::parse_scalar("  "), AttrValue::Null);
        assert_eq!(AttrValue::parse_scalar("12"), AttrValue::Int(12));
        assert_eq!(AttrValue::parse_scalar("-3"), AttrValue::Int(-3));
        assert_eq!(AttrValue::parse_scalar("4.35"), AttrValue::Float(4.35));
        assert_eq!(
            AttrValue::parse_scalar("Quercus robur"),
            AttrValue::Text("Quercus robur".to_string())
        );
        assert_eq!(
            AttrValue::parse_scalar(" Tilia "),
            AttrValue::Text("Tilia".to_string())
        );
    }

    #[test]
    fn json_values_convert() {
        assert_eq!(
            AttrValue::from_json(&serde_json::Value::Null),
            AttrValue::Null
        );
        assert_eq!(
            AttrValue::from_json(&serde_json::json!(1987)),
            AttrValue::Int(1987)
        );
        assert_eq!(
            AttrValue::from_json(&serde_json::json!(12.5)),
            AttrValue::Float(12.5)
        );
        assert_eq!(
            AttrValue::from_json(&serde_json::json!("Ulmus")),
            AttrValue::Text("Ulmus".to_string())
        );
    }

    #[test]
    fn nested_json_is_kept_as_text() {
        let value = serde_json::json!({"genus": "Quercus"});
        match AttrValue::from_json(&value) {
            AttrValue::Text(s) => assert!(s.contains("Quercus")),
            other => panic!("expected text, got {other:?}"),
        }
    }

    #[test]
    fn ensure_column_is_idempotent() {
        let mut table = FeatureTable::new(Crs::Wgs84);
        table.ensure_column("Height");
        table.ensure_column("Latin_name");
        table.ensure_column("Height");

        assert_eq!(table.columns, vec!["Height", "Latin_name"]);
    }

    #[test]
    fn rows_carry_geometry_and_attrs() {
        let mut table = FeatureTable::new(Crs::Wgs84);
        table.ensure_column("Latin_name");
        table.push(
            FeatureRow::new(Some(Point::new(4.35, 52.01).into()))
                .with_attr("Latin_name", "Quercus robur"),
        );

        assert_eq!(table.len(), 1);
        assert_eq!(
            table.rows[0].attr("Latin_name"),
            Some(&AttrValue::Text("Quercus robur".to_string()))
        );
        assert!(table.rows[0].geometry.is_some());
    }
}
