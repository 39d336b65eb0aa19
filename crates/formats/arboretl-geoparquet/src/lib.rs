//! GeoParquet reader and writer for tree inventory artifacts.
//!
//! Geometry travels as a WKB binary column described by the `geo` file
//! metadata key. The writer can additionally emit a `bbox` struct column
//! (`xmin`, `ymin`, `xmax`, `ymax`) with a GeoParquet 1.1 covering entry, so
//! downstream range queries can prune row groups without decoding geometry.
//! The reader never surfaces `bbox` as an attribute: it is a derived column
//! and is recomputed whenever the file is rewritten.
#![allow(clippy::result_large_err)]

use std::collections::BTreeSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use arrow::array::{
    Array, ArrayRef, BinaryArray, BinaryBuilder, BooleanArray, BooleanBuilder, Float64Array,
    Float64Builder, Int32Array, Int64Array, Int64Builder, LargeBinaryArray, LargeStringArray,
    StringArray, StringBuilder, StructArray,
};
use arrow::buffer::NullBuffer;
use arrow::datatypes::{DataType, Field, Fields, Schema};
use arrow::record_batch::RecordBatch;
use parquet::arrow::ArrowWriter;
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use parquet::basic::{Compression, ZstdLevel};
use parquet::file::metadata::KeyValue;
use parquet::file::properties::WriterProperties;

use arboretl_core::{
    AttrValue, BoundingBox, Crs, FeatureRow, FeatureTable, GEOMETRY_COLUMN,
    InvalidGeometryPolicy, geometry,
};
use arboretl_shared::{
    FormatReadError, FormatResult, FormatWriteError, FormatWriteResult, SourcePosition,
};
use geo_types::Geometry;
use geozero::wkb::Wkb;
use geozero::{CoordDimensions, ToGeo, ToWkb};

/// Name of the bounding-box struct column.
pub const BBOX_COLUMN: &str = "bbox";

/// Field names of the bounding-box struct, in order.
pub const BBOX_FIELDS: [&str; 4] = ["xmin", "ymin", "xmax", "ymax"];

/// The `geo` file metadata of a GeoParquet file, reduced to the parts the
/// pipeline cares about.
#[derive(Debug, Clone, PartialEq)]
pub struct GeoMetadata {
    /// Specification version, e.g. `1.1.0`
    pub version: String,
    /// Name of the primary geometry column
    pub primary_column: String,
    /// Geometry encoding; the pipeline writes and expects `WKB`
    pub encoding: String,
    /// Geometry types present, OGC names
    pub geometry_types: Vec<String>,
    /// Whether the primary column declares a bbox covering
    pub has_bbox_covering: bool,
}

/// Writer knobs. The codec is a tunable, not a correctness requirement.
#[derive(Debug, Clone, Copy)]
pub struct WriteOptions {
    /// ZSTD compression level
    pub zstd_level: i32,
    /// Maximum rows per row group
    pub row_group_size: usize,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            zstd_level: 15,
            row_group_size: 8192,
        }
    }
}

/// Everything a single read pass produces.
#[derive(Debug)]
pub struct GeoParquetContents {
    /// The decoded feature table, without the `bbox` column
    pub table: FeatureTable,
    /// Stored bbox per surviving row; `None` entries mean the stored struct
    /// was null, an empty vec means the file had no bbox column at all
    pub bboxes: Vec<Option<BoundingBox>>,
    /// Whether the file carried a bbox struct column
    pub had_bbox_column: bool,
}

/// Read a GeoParquet file into a feature table, dropping any bbox column.
pub fn read_geoparquet(
    path: &Path,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<FeatureTable> {
    Ok(read_geoparquet_full(path, policy, fallback_crs)?.table)
}

/// Read a GeoParquet file, keeping the stored bbox column alongside the rows.
pub fn read_geoparquet_full(
    path: &Path,
    policy: InvalidGeometryPolicy,
    fallback_crs: Crs,
) -> FormatResult<GeoParquetContents> {
    let context = format!("GeoParquet '{}'", path.display());
    let file = File::open(path).map_err(|source| FormatReadError::Io {
        source,
        context: Some(context.clone()),
    })?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(context.clone()),
        })?;

    let geo = parse_geo_value(
        builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(Vec::as_slice),
        &context,
    )?;
    let geometry_column = geo
        .as_ref()
        .map_or(GEOMETRY_COLUMN, |g| g.primary_column.as_str())
        .to_string();
    // A `geo` key without an explicit crs means OGC:CRS84 per the spec;
    // a file without the key defers to the descriptor.
    let crs = if geo.is_some() { Crs::Wgs84 } else { fallback_crs };

    let schema = builder.schema().clone();
    let mut table = FeatureTable::new(crs);
    for field in schema.fields() {
        if field.name() != geometry_column.as_str() && field.name() != BBOX_COLUMN {
            table.ensure_column(field.name());
        }
    }
    let had_bbox_column = schema.column_with_name(BBOX_COLUMN).is_some();

    let reader = builder.build().map_err(|err| FormatReadError::Parse {
        message: err.to_string(),
        position: None,
        context: Some(context.clone()),
    })?;

    let mut bboxes = Vec::new();
    let mut skipped: u64 = 0;
    let mut row_number: u64 = 0;

    for batch in reader {
        let batch = batch.map_err(|err| FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(context.clone()),
        })?;

        for row in 0..batch.num_rows() {
            row_number += 1;
            let mut feature = FeatureRow::default();
            let mut bbox = None;

            let decoded = decode_row(&batch, row, &geometry_column, row_number, &mut feature);
            match decoded {
                Ok(stored_bbox) => bbox = stored_bbox,
                Err(err) if err.is_geometry() && policy == InvalidGeometryPolicy::Skip => {
                    log::warn!("skipping row: {err}");
                    skipped += 1;
                    continue;
                },
                Err(err) => return Err(err),
            }

            table.push(feature);
            if had_bbox_column {
                bboxes.push(bbox);
            }
        }
    }

    if skipped > 0 {
        log::info!("skipped {skipped} row(s) with invalid geometry in {context}");
    }
    Ok(GeoParquetContents {
        table,
        bboxes,
        had_bbox_column,
    })
}

/// Decode one row of a batch into `feature`, returning its stored bbox.
fn decode_row(
    batch: &RecordBatch,
    row: usize,
    geometry_column: &str,
    row_number: u64,
    feature: &mut FeatureRow,
) -> FormatResult<Option<BoundingBox>> {
    let mut bbox = None;

    for (index, field) in batch.schema_ref().fields().iter().enumerate() {
        let column = batch.column(index);
        if field.name() == geometry_column {
            feature.geometry = decode_geometry(column, row, field.name(), row_number)?;
        } else if field.name() == BBOX_COLUMN {
            bbox = decode_bbox(column, row, row_number)?;
        } else {
            feature
                .attrs
                .insert(field.name().clone(), decode_attr(column, row, field.name())?);
        }
    }
    Ok(bbox)
}

fn decode_geometry(
    column: &ArrayRef,
    row: usize,
    name: &str,
    row_number: u64,
) -> FormatResult<Option<Geometry<f64>>> {
    if column.is_null(row) {
        return Ok(None);
    }
    let wkb: &[u8] = if let Some(array) = column.as_any().downcast_ref::<BinaryArray>() {
        array.value(row)
    } else if let Some(array) = column.as_any().downcast_ref::<LargeBinaryArray>() {
        array.value(row)
    } else {
        return Err(FormatReadError::Schema {
            message: format!(
                "geometry column '{name}' has type {:?}, expected binary WKB",
                column.data_type()
            ),
            context: None,
        });
    };

    let geometry = Wkb(wkb).to_geo().map_err(|err| {
        FormatReadError::geometry_at(
            format!("invalid WKB: {err}"),
            SourcePosition::row_field(row_number, name),
        )
    })?;
    Ok(Some(geometry))
}

fn decode_bbox(
    column: &ArrayRef,
    row: usize,
    row_number: u64,
) -> FormatResult<Option<BoundingBox>> {
    let Some(array) = column.as_any().downcast_ref::<StructArray>() else {
        return Err(FormatReadError::Schema {
            message: format!(
                "bbox column has type {:?}, expected a struct",
                column.data_type()
            ),
            context: None,
        });
    };
    if array.is_null(row) {
        return Ok(None);
    }

    let mut corners = [0.0_f64; 4];
    for (slot, name) in corners.iter_mut().zip(BBOX_FIELDS) {
        let values = array
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .ok_or_else(|| FormatReadError::Schema {
                message: format!("bbox struct is missing Float64 field '{name}'"),
                context: None,
            })?;
        if values.is_null(row) {
            return Err(FormatReadError::Parse {
                message: format!("bbox field '{name}' is null"),
                position: Some(SourcePosition::row(row_number)),
                context: None,
            });
        }
        *slot = values.value(row);
    }
    Ok(Some(BoundingBox::new(
        corners[0], corners[1], corners[2], corners[3],
    )))
}

fn decode_attr(column: &ArrayRef, row: usize, name: &str) -> FormatResult<AttrValue> {
    if column.is_null(row) {
        return Ok(AttrValue::Null);
    }
    let any = column.as_any();
    let value = if let Some(array) = any.downcast_ref::<StringArray>() {
        AttrValue::Text(array.value(row).to_string())
    } else if let Some(array) = any.downcast_ref::<LargeStringArray>() {
        AttrValue::Text(array.value(row).to_string())
    } else if let Some(array) = any.downcast_ref::<Int64Array>() {
        AttrValue::Int(array.value(row))
    } else if let Some(array) = any.downcast_ref::<Int32Array>() {
        AttrValue::Int(i64::from(array.value(row)))
    } else if let Some(array) = any.downcast_ref::<Float64Array>() {
        AttrValue::Float(array.value(row))
    } else if let Some(array) = any.downcast_ref::<BooleanArray>() {
        AttrValue::Bool(array.value(row))
    } else {
        return Err(FormatReadError::Schema {
            message: format!(
                "column '{name}' has unsupported type {:?}",
                column.data_type()
            ),
            context: None,
        });
    };
    Ok(value)
}

/// Parse the `geo` file metadata key of a GeoParquet file, if present.
pub fn read_geo_metadata(path: &Path) -> FormatResult<Option<GeoMetadata>> {
    let context = format!("GeoParquet '{}'", path.display());
    let file = File::open(path).map_err(|source| FormatReadError::Io {
        source,
        context: Some(context.clone()),
    })?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(context.clone()),
        })?;
    parse_geo_value(
        builder
            .metadata()
            .file_metadata()
            .key_value_metadata()
            .map(Vec::as_slice),
        &context,
    )
}

fn parse_geo_value(
    key_values: Option<&[KeyValue]>,
    context: &str,
) -> FormatResult<Option<GeoMetadata>> {
    let Some(raw) = key_values
        .and_then(|kvs| kvs.iter().find(|kv| kv.key == "geo"))
        .and_then(|kv| kv.value.as_deref())
    else {
        return Ok(None);
    };

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|err| FormatReadError::Parse {
            message: format!("geo metadata is not valid JSON: {err}"),
            position: None,
            context: Some(context.to_string()),
        })?;

    let missing = |what: &str| FormatReadError::Parse {
        message: format!("geo metadata is missing {what}"),
        position: None,
        context: Some(context.to_string()),
    };

    let version = value
        .get("version")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| missing("version"))?
        .to_string();
    let primary_column = value
        .get("primary_column")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| missing("primary_column"))?
        .to_string();
    let column = value
        .pointer(&format!("/columns/{primary_column}"))
        .ok_or_else(|| missing("the primary column entry"))?;
    let encoding = column
        .get("encoding")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| missing("the primary column encoding"))?
        .to_string();
    let geometry_types = column
        .get("geometry_types")
        .and_then(serde_json::Value::as_array)
        .map(|types| {
            types
                .iter()
                .filter_map(serde_json::Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    let has_bbox_covering = column.pointer("/covering/bbox").is_some();

    Ok(Some(GeoMetadata {
        version,
        primary_column,
        encoding,
        geometry_types,
        has_bbox_covering,
    }))
}

/// Debug names of the compression codecs used across all column chunks.
pub fn compression_names(path: &Path) -> FormatResult<Vec<String>> {
    let context = format!("GeoParquet '{}'", path.display());
    let file = File::open(path).map_err(|source| FormatReadError::Io {
        source,
        context: Some(context.clone()),
    })?;
    let builder =
        ParquetRecordBatchReaderBuilder::try_new(file).map_err(|err| FormatReadError::Parse {
            message: err.to_string(),
            position: None,
            context: Some(context),
        })?;

    let metadata = builder.metadata();
    let mut names = BTreeSet::new();
    for row_group in metadata.row_groups() {
        for column in row_group.columns() {
            names.insert(format!("{:?}", column.compression()));
        }
    }
    Ok(names.into_iter().collect())
}

/// Write a feature table as GeoParquet.
///
/// `bboxes`, when given, must be row-parallel with the table and produces the
/// `bbox` struct column plus a covering entry in the `geo` metadata.
pub fn write_geoparquet(
    path: &Path,
    table: &FeatureTable,
    bboxes: Option<&[Option<BoundingBox>]>,
    options: &WriteOptions,
) -> FormatWriteResult<()> {
    let context = format!("GeoParquet '{}'", path.display());
    if let Some(bboxes) = bboxes
        && bboxes.len() != table.len()
    {
        return Err(FormatWriteError::encode(format!(
            "bbox column has {} entries for {} rows",
            bboxes.len(),
            table.len()
        )));
    }

    let mut fields = Vec::with_capacity(table.columns.len() + 2);
    let mut arrays: Vec<ArrayRef> = Vec::with_capacity(table.columns.len() + 2);
    for name in &table.columns {
        let (field, array) = build_attr_column(name, table);
        fields.push(field);
        arrays.push(array);
    }

    fields.push(Field::new(GEOMETRY_COLUMN, DataType::Binary, true));
    arrays.push(build_geometry_column(table)?);

    if let Some(bboxes) = bboxes {
        let (field, array) = build_bbox_column(bboxes);
        fields.push(field);
        arrays.push(array);
    }

    let schema = Arc::new(Schema::new(fields));
    let batch = RecordBatch::try_new(schema.clone(), arrays)
        .map_err(|err| FormatWriteError::encode(err.to_string()))?;

    let geo_json = geo_metadata_json(table, bboxes.is_some());
    let level = ZstdLevel::try_new(options.zstd_level)
        .map_err(|err| FormatWriteError::encode(format!("invalid ZSTD level: {err}")))?;
    let props = WriterProperties::builder()
        .set_compression(Compression::ZSTD(level))
        .set_max_row_group_size(options.row_group_size)
        .set_key_value_metadata(Some(vec![KeyValue {
            key: "geo".to_string(),
            value: Some(geo_json),
        }]))
        .build();

    let file = File::create(path).map_err(|source| FormatWriteError::Io {
        source,
        context: Some(context.clone()),
    })?;
    let mut writer = ArrowWriter::try_new(file, schema, Some(props))
        .map_err(|err| FormatWriteError::encode(err.to_string()))?;
    writer
        .write(&batch)
        .map_err(|err| FormatWriteError::encode(err.to_string()))?;
    writer
        .close()
        .map_err(|err| FormatWriteError::encode(err.to_string()))?;

    log::debug!("wrote {} row(s) to {context}", table.len());
    Ok(())
}

// Inferred arrow type of an attribute column, widened over all rows.
#[derive(Clone, Copy, PartialEq)]
enum ColumnKind {
    Unknown,
    Bool,
    Int,
    Float,
    Text,
}

impl ColumnKind {
    fn merge(self, value: &AttrValue) -> ColumnKind {
        let observed = match value {
            AttrValue::Null => return self,
            AttrValue::Bool(_) => ColumnKind::Bool,
            AttrValue::Int(_) => ColumnKind::Int,
            AttrValue::Float(_) => ColumnKind::Float,
            AttrValue::Text(_) => ColumnKind::Text,
        };
        match (self, observed) {
            (ColumnKind::Unknown, kind) => kind,
            (a, b) if a == b => a,
            // Integers widen to floats; everything else mixes down to text.
            (ColumnKind::Int, ColumnKind::Float) | (ColumnKind::Float, ColumnKind::Int) => {
                ColumnKind::Float
            },
            _ => ColumnKind::Text,
        }
    }
}

fn build_attr_column(name: &str, table: &FeatureTable) -> (Field, ArrayRef) {
    let kind = table
        .rows
        .iter()
        .fold(ColumnKind::Unknown, |kind, row| {
            row.attr(name).map_or(kind, |value| kind.merge(value))
        });

    match kind {
        ColumnKind::Bool => {
            let mut builder = BooleanBuilder::with_capacity(table.len());
            for row in &table.rows {
                match row.attr(name) {
                    Some(AttrValue::Bool(b)) => builder.append_value(*b),
                    _ => builder.append_null(),
                }
            }
            (
                Field::new(name, DataType::Boolean, true),
                Arc::new(builder.finish()),
            )
        },
        ColumnKind::Int => {
            let mut builder = Int64Builder::with_capacity(table.len());
            for row in &table.rows {
                match row.attr(name) {
                    Some(AttrValue::Int(i)) => builder.append_value(*i),
                    _ => builder.append_null(),
                }
            }
            (
                Field::new(name, DataType::Int64, true),
                Arc::new(builder.finish()),
            )
        },
        ColumnKind::Float => {
            let mut builder = Float64Builder::with_capacity(table.len());
            for row in &table.rows {
                match row.attr(name) {
                    Some(AttrValue::Float(v)) => builder.append_value(*v),
                    #[allow(clippy::cast_precision_loss)]
                    Some(AttrValue::Int(i)) => builder.append_value(*i as f64),
                    _ => builder.append_null(),
                }
            }
            (
                Field::new(name, DataType::Float64, true),
                Arc::new(builder.finish()),
            )
        },
        ColumnKind::Text | ColumnKind::Unknown => {
            let mut builder = StringBuilder::new();
            for row in &table.rows {
                match row.attr(name) {
                    Some(AttrValue::Null) | None => builder.append_null(),
                    Some(value) => builder.append_value(value.to_string()),
                }
            }
            (
                Field::new(name, DataType::Utf8, true),
                Arc::new(builder.finish()),
            )
        },
    }
}

fn build_geometry_column(table: &FeatureTable) -> FormatWriteResult<ArrayRef> {
    let mut builder = BinaryBuilder::new();
    for (index, row) in table.rows.iter().enumerate() {
        match &row.geometry {
            Some(geometry) => {
                let wkb = geometry
                    .to_wkb(CoordDimensions::xy())
                    .map_err(|err| FormatWriteError::Encode {
                        message: format!("WKB encoding failed: {err}"),
                        position: Some(SourcePosition::row(index as u64 + 1)),
                    })?;
                builder.append_value(&wkb);
            },
            None => builder.append_null(),
        }
    }
    Ok(Arc::new(builder.finish()))
}

fn build_bbox_column(bboxes: &[Option<BoundingBox>]) -> (Field, ArrayRef) {
    let fields: Fields = BBOX_FIELDS
        .iter()
        .map(|name| Field::new(*name, DataType::Float64, false))
        .collect();

    let mut corners: [Vec<f64>; 4] = Default::default();
    let mut validity = Vec::with_capacity(bboxes.len());
    for bbox in bboxes {
        let filled = bbox.unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0));
        corners[0].push(filled.min_x);
        corners[1].push(filled.min_y);
        corners[2].push(filled.max_x);
        corners[3].push(filled.max_y);
        validity.push(bbox.is_some());
    }

    let arrays: Vec<ArrayRef> = corners
        .into_iter()
        .map(|values| Arc::new(Float64Array::from(values)) as ArrayRef)
        .collect();
    let nulls = if validity.iter().all(|v| *v) {
        None
    } else {
        Some(NullBuffer::from(validity))
    };
    let array = StructArray::new(fields.clone(), arrays, nulls);

    (
        Field::new(BBOX_COLUMN, DataType::Struct(fields), true),
        Arc::new(array),
    )
}

fn geo_metadata_json(table: &FeatureTable, with_covering: bool) -> String {
    let geometry_types: BTreeSet<&str> = table
        .rows
        .iter()
        .filter_map(|row| row.geometry.as_ref())
        .map(geometry::geometry_type_name)
        .collect();

    let mut column = serde_json::json!({
        "encoding": "WKB",
        "geometry_types": geometry_types.into_iter().collect::<Vec<_>>(),
    });
    if with_covering {
        column["covering"] = serde_json::json!({
            "bbox": {
                "xmin": [BBOX_COLUMN, "xmin"],
                "ymin": [BBOX_COLUMN, "ymin"],
                "xmax": [BBOX_COLUMN, "xmax"],
                "ymax": [BBOX_COLUMN, "ymax"],
            }
        });
    }

    // No explicit crs: GeoParquet defaults to OGC:CRS84, the corpus target.
    serde_json::json!({
        "version": "1.1.0",
        "primary_column": GEOMETRY_COLUMN,
        "columns": { GEOMETRY_COLUMN: column },
    })
    .to_string()
}
