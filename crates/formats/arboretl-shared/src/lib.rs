use std::error::Error as StdError;
use std::fmt;

/// A position within a source dataset, such as a CSV record or a container layer.
///
/// All indices are 1-based where possible to align with human expectations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourcePosition {
    /// Row number in the source (1-based, header excluded for tabular sources)
    pub row: Option<u64>,
    /// Name of the source column/field involved
    pub field: Option<String>,
    /// Named layer inside a container format
    pub layer: Option<String>,
}

impl SourcePosition {
    /// Position pointing at a single row.
    #[must_use]
    pub fn row(row: u64) -> Self {
        Self {
            row: Some(row),
            ..Self::default()
        }
    }

    /// Position pointing at a field within a row.
    #[must_use]
    pub fn row_field(row: u64, field: impl Into<String>) -> Self {
        Self {
            row: Some(row),
            field: Some(field.into()),
            ..Self::default()
        }
    }

    /// Attach a layer name.
    #[must_use]
    pub fn in_layer(mut self, layer: impl Into<String>) -> Self {
        self.layer = Some(layer.into());
        self
    }

    /// Returns true when the position does not contain any location metadata.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.row.is_none() && self.field.is_none() && self.layer.is_none()
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();

        if let Some(layer) = &self.layer {
            parts.push(format!("layer '{layer}'"));
        }
        if let Some(row) = self.row {
            parts.push(format!("row {row}"));
        }
        if let Some(field) = &self.field {
            parts.push(format!("column '{field}'"));
        }

        if parts.is_empty() {
            write!(f, "unknown position")
        } else {
            write!(f, "{}", parts.join(", "))
        }
    }
}

/// Errors that can occur when reading a source dataset into a feature table.
#[derive(Debug)]
pub enum FormatReadError {
    /// An underlying I/O failure occurred.
    Io {
        /// The originating error.
        source: std::io::Error,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// Parsing failed for the input source.
    Parse {
        /// Human readable description of the failure.
        message: String,
        /// Optional position describing where the failure occurred.
        position: Option<SourcePosition>,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// A geometry value could not be decoded.
    ///
    /// Kept separate from [`FormatReadError::Parse`] so callers can apply a
    /// per-row tolerance policy to geometry decoding without also tolerating
    /// structural parse failures.
    Geometry {
        /// Human readable description of the failure.
        message: String,
        /// Optional position describing where the failure occurred.
        position: Option<SourcePosition>,
    },
    /// The source schema is unusable (missing columns, no feature layers).
    Schema {
        /// Human readable description of the failure.
        message: String,
        /// Optional context describing what was being read.
        context: Option<String>,
    },
    /// The declared or probed format is not supported.
    Unsupported {
        /// The format designation as declared or detected.
        format: String,
    },
    /// Other error type not classified above.
    Other {
        /// Human readable description of the failure.
        message: String,
    },
}

impl FormatReadError {
    fn fmt_context(context: Option<&str>) -> String {
        context
            .map(|c| format!(" while reading {c}"))
            .unwrap_or_default()
    }

    fn fmt_position(position: Option<&SourcePosition>) -> String {
        position.map(|pos| format!(" at {pos}")).unwrap_or_default()
    }

    /// Shorthand for a geometry failure at a row/field position.
    #[must_use]
    pub fn geometry_at(message: impl Into<String>, position: SourcePosition) -> Self {
        FormatReadError::Geometry {
            message: message.into(),
            position: Some(position),
        }
    }

    /// Returns true when the error is a per-value geometry decoding failure.
    #[must_use]
    pub fn is_geometry(&self) -> bool {
        matches!(self, FormatReadError::Geometry { .. })
    }

    /// Attach additional context to the error, returning the updated error.
    #[must_use]
    pub fn with_additional_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        match &mut self {
            FormatReadError::Io {
                context: existing, ..
            }
            | FormatReadError::Parse {
                context: existing, ..
            }
            | FormatReadError::Schema {
                context: existing, ..
            } => match existing {
                Some(existing) if !existing.is_empty() => {
                    existing.push_str("; ");
                    existing.push_str(&context);
                },
                _ => *existing = Some(context),
            },
            FormatReadError::Geometry { message, .. } | FormatReadError::Other { message } => {
                message.push_str(" (");
                message.push_str(&context);
                message.push(')');
            },
            FormatReadError::Unsupported { .. } => {},
        }
        self
    }
}

impl fmt::Display for FormatReadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatReadError::Io { source, context } => {
                write!(
                    f,
                    "I/O error{}: {source}",
                    Self::fmt_context(context.as_deref())
                )
            },
            FormatReadError::Parse {
                message,
                position,
                context,
            } => write!(
                f,
                "Parse error{}{}: {message}",
                Self::fmt_context(context.as_deref()),
                Self::fmt_position(position.as_ref())
            ),
            FormatReadError::Geometry { message, position } => write!(
                f,
                "Geometry error{}: {message}",
                Self::fmt_position(position.as_ref())
            ),
            FormatReadError::Schema { message, context } => write!(
                f,
                "Schema error{}: {message}",
                Self::fmt_context(context.as_deref())
            ),
            FormatReadError::Unsupported { format } => {
                write!(f, "Unsupported format '{format}'")
            },
            FormatReadError::Other { message } => f.write_str(message),
        }
    }
}

impl StdError for FormatReadError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FormatReadError::Io { source, .. } => Some(source),
            FormatReadError::Parse { .. }
            | FormatReadError::Geometry { .. }
            | FormatReadError::Schema { .. }
            | FormatReadError::Unsupported { .. }
            | FormatReadError::Other { .. } => None,
        }
    }
}

impl From<std::io::Error> for FormatReadError {
    fn from(source: std::io::Error) -> Self {
        FormatReadError::Io {
            source,
            context: None,
        }
    }
}

/// Result type alias that uses [`FormatReadError`].
pub type FormatResult<T> = Result<T, FormatReadError>;

/// Errors that can occur when writing a feature table out to a sink format.
#[derive(Debug)]
pub enum FormatWriteError {
    /// An underlying I/O failure occurred.
    Io {
        /// The originating error.
        source: std::io::Error,
        /// Optional context describing what was being written.
        context: Option<String>,
    },
    /// A value could not be encoded into the sink format.
    Encode {
        /// Human readable description of the failure.
        message: String,
        /// Optional position describing where the failure occurred.
        position: Option<SourcePosition>,
    },
}

impl FormatWriteError {
    /// Shorthand for an encoding failure without a position.
    #[must_use]
    pub fn encode(message: impl Into<String>) -> Self {
        FormatWriteError::Encode {
            message: message.into(),
            position: None,
        }
    }
}

impl fmt::Display for FormatWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatWriteError::Io { source, context } => {
                write!(
                    f,
                    "I/O error{}: {source}",
                    context
                        .as_deref()
                        .map(|c| format!(" while writing {c}"))
                        .unwrap_or_default()
                )
            },
            FormatWriteError::Encode { message, position } => write!(
                f,
                "Encoding error{}: {message}",
                position
                    .as_ref()
                    .map(|pos| format!(" at {pos}"))
                    .unwrap_or_default()
            ),
        }
    }
}

impl StdError for FormatWriteError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            FormatWriteError::Io { source, .. } => Some(source),
            FormatWriteError::Encode { .. } => None,
        }
    }
}

impl From<std::io::Error> for FormatWriteError {
    fn from(source: std::io::Error) -> Self {
        FormatWriteError::Io {
            source,
            context: None,
        }
    }
}

/// Result type alias that uses [`FormatWriteError`].
pub type FormatWriteResult<T> = Result<T, FormatWriteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_source_position() {
        let pos = SourcePosition::row_field(10, "GEOMETRIE");

        assert_eq!(pos.to_string(), "row 10, column 'GEOMETRIE'");
    }

    #[test]
    fn display_position_with_layer() {
        let pos = SourcePosition::row(3).in_layer("bomen_noord");

        assert_eq!(pos.to_string(), "layer 'bomen_noord', row 3");
    }

    #[test]
    fn empty_position_is_detected() {
        assert!(SourcePosition::default().is_empty());
        assert!(!SourcePosition::row(1).is_empty());
    }

    #[test]
    fn display_parse_error_with_context() {
        let error = FormatReadError::Parse {
            message: "unexpected delimiter".to_string(),
            position: Some(SourcePosition::row_field(5, "LAT")),
            context: Some("trees.csv".to_string()),
        };

        assert_eq!(
            error.to_string(),
            "Parse error while reading trees.csv at row 5, column 'LAT': unexpected delimiter"
        );
    }

    #[test]
    fn display_geometry_error() {
        let error = FormatReadError::geometry_at(
            "invalid WKT: expected POINT",
            SourcePosition::row_field(2, "wkt"),
        );

        assert!(error.is_geometry());
        assert_eq!(
            error.to_string(),
            "Geometry error at row 2, column 'wkt': invalid WKT: expected POINT"
        );
    }

    #[test]
    fn display_write_error() {
        let error = FormatWriteError::Io {
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            context: Some("GeoParquet 'out.parquet'".to_string()),
        };
        assert_eq!(
            error.to_string(),
            "I/O error while writing GeoParquet 'out.parquet': denied"
        );

        let error = FormatWriteError::encode("geometry has no WKB form");
        assert_eq!(error.to_string(), "Encoding error: geometry has no WKB form");
    }

    #[test]
    fn additional_context_is_appended() {
        let error = FormatReadError::Schema {
            message: "no feature layers".to_string(),
            context: Some("parks.gpkg".to_string()),
        }
        .with_additional_context("dataset 'Eindhoven'");

        assert_eq!(
            error.to_string(),
            "Schema error while reading parks.gpkg; dataset 'Eindhoven': no feature layers"
        );
    }
}
