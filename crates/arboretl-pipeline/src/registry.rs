//! Static registry of the formats the pipeline can read and write.
//!
//! Backs the CLI's format listing and lookup. The table is compile-time
//! static: support for a format is a property of the build, not of the run.

/// Level of support for one side (read or write) of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupportStatus {
    /// Implemented and exercised by the pipeline
    Supported,
    /// Not implemented and not on the roadmap
    NotSupported,
    /// On the roadmap but not implemented yet
    Planned,
}

impl SupportStatus {
    /// Whether the format side can actually be used today.
    #[must_use]
    pub fn is_supported(&self) -> bool {
        matches!(self, SupportStatus::Supported)
    }

    /// Short form for tabular CLI output.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            SupportStatus::Supported => "yes",
            SupportStatus::NotSupported => "no",
            SupportStatus::Planned => "planned",
        }
    }
}

/// Read/write support pair for a format.
#[derive(Debug, Clone, Copy)]
pub struct FormatCapabilities {
    pub read: SupportStatus,
    pub write: SupportStatus,
}

/// One entry in the format registry.
#[derive(Debug, Clone, Copy)]
pub struct FormatDriver {
    /// Lookup key; matches the `file_type` values used in configuration
    pub short_name: &'static str,
    /// Human-readable format name
    pub long_name: &'static str,
    pub capabilities: FormatCapabilities,
}

const FORMATS: &[FormatDriver] = &[
    FormatDriver {
        short_name: "csv",
        long_name: "Comma Separated Values",
        capabilities: FormatCapabilities {
            read: SupportStatus::Supported,
            write: SupportStatus::NotSupported,
        },
    },
    FormatDriver {
        short_name: "geojson",
        long_name: "GeoJSON",
        capabilities: FormatCapabilities {
            read: SupportStatus::Supported,
            write: SupportStatus::NotSupported,
        },
    },
    FormatDriver {
        short_name: "geoparquet",
        long_name: "GeoParquet",
        capabilities: FormatCapabilities {
            read: SupportStatus::Supported,
            write: SupportStatus::Supported,
        },
    },
    FormatDriver {
        short_name: "shapefile",
        long_name: "ESRI Shapefile",
        capabilities: FormatCapabilities {
            read: SupportStatus::Supported,
            write: SupportStatus::NotSupported,
        },
    },
    FormatDriver {
        short_name: "gpkg",
        long_name: "OGC GeoPackage",
        capabilities: FormatCapabilities {
            read: SupportStatus::Supported,
            write: SupportStatus::NotSupported,
        },
    },
    FormatDriver {
        short_name: "flatgeobuf",
        long_name: "FlatGeobuf",
        capabilities: FormatCapabilities {
            read: SupportStatus::Planned,
            write: SupportStatus::Planned,
        },
    },
];

/// All registered formats, in registry order.
#[must_use]
pub fn all_formats() -> &'static [FormatDriver] {
    FORMATS
}

/// Look up a format by its short name, case-insensitively.
#[must_use]
pub fn find_format(name: &str) -> Option<&'static FormatDriver> {
    FORMATS
        .iter()
        .find(|driver| driver.short_name.eq_ignore_ascii_case(name.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn geoparquet_is_the_only_writable_format() {
        let writable: Vec<&str> = all_formats()
            .iter()
            .filter(|d| d.capabilities.write.is_supported())
            .map(|d| d.short_name)
            .collect();
        assert_eq!(writable, ["geoparquet"]);
    }

    #[test]
    fn every_configured_file_type_is_readable() {
        for name in ["csv", "geojson", "geoparquet", "shapefile", "gpkg"] {
            let driver = find_format(name).unwrap();
            assert!(driver.capabilities.read.is_supported(), "{name}");
        }
    }

    #[test]
    fn lookup_ignores_case_and_padding() {
        assert!(find_format("GeoParquet").is_some());
        assert!(find_format("  GPKG  ").is_some());
        assert!(find_format("dwg").is_none());
    }

    #[test]
    fn planned_formats_are_not_usable() {
        let fgb = find_format("flatgeobuf").unwrap();
        assert!(!fgb.capabilities.read.is_supported());
        assert_eq!(fgb.capabilities.read.as_str(), "planned");
    }
}
