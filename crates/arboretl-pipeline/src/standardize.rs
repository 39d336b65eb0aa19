//! Column standardization: reshape a parsed table onto the template schema.
//!
//! Every output file carries the same columns in the same order, whatever the
//! source called them. Resolution per standard field, first hit wins:
//!
//! 1. a descriptor metadata constant,
//! 2. the mapped source column from `column_mapping`,
//! 3. a column already carrying the standard name,
//! 4. the `"N/A"` sentinel.
//!
//! Metadata keys outside the template are appended after the template fields
//! so provenance constants survive even when the template does not name them.

use arboretl_core::{
    AttrValue, DatasetDescriptor, FeatureTable, MISSING_VALUE, Template,
};

/// What standardization did to the table, for logging and the run report.
#[derive(Debug, Default)]
pub struct StandardizeSummary {
    /// Template fields the source could not fill (sentinel was stamped)
    pub missing_fields: Vec<String>,
    /// Source columns discarded because nothing mapped them
    pub dropped_columns: usize,
}

/// Rewrite `table` in place onto the template's standard schema.
pub fn standardize(
    table: &mut FeatureTable,
    descriptor: &DatasetDescriptor,
    template: &Template,
) -> StandardizeSummary {
    let mut summary = StandardizeSummary::default();

    let mut output_columns: Vec<String> =
        template.field_names().map(str::to_string).collect();
    for key in descriptor.metadata.keys() {
        if !template.contains(key) {
            output_columns.push(key.clone());
        }
    }

    for field in template.field_names() {
        if descriptor.metadata.contains_key(field) {
            let constant = AttrValue::Text(descriptor.metadata[field].clone());
            for row in &mut table.rows {
                row.attrs.insert(field.to_string(), constant.clone());
            }
            continue;
        }

        if let Some(source_column) = descriptor.column_mapping.get(field) {
            if table.columns.iter().any(|c| c == source_column) {
                for row in &mut table.rows {
                    let value = row.attrs.get(source_column).cloned().unwrap_or(AttrValue::Null);
                    row.attrs.insert(field.to_string(), value);
                }
                continue;
            }
            log::warn!(
                "[{}] mapped column '{source_column}' for field '{field}' not present in source",
                descriptor.name
            );
        }

        // The source may already use the standard name; leave those values be.
        if table.columns.iter().any(|c| c == field) {
            continue;
        }

        log::warn!(
            "[{}] source provides no value for standard field '{field}'; filling with '{MISSING_VALUE}'",
            descriptor.name
        );
        summary.missing_fields.push(field.to_string());
        for row in &mut table.rows {
            row.attrs
                .insert(field.to_string(), AttrValue::Text(MISSING_VALUE.to_string()));
        }
    }

    // Stamp the non-template metadata constants onto every row.
    for (key, value) in &descriptor.metadata {
        if template.contains(key) {
            continue;
        }
        let constant = AttrValue::Text(value.clone());
        for row in &mut table.rows {
            row.attrs.insert(key.clone(), constant.clone());
        }
    }

    summary.dropped_columns = table
        .columns
        .iter()
        .filter(|c| !output_columns.iter().any(|o| o == *c))
        .count();

    // Prune attribute values the output schema no longer references.
    for row in &mut table.rows {
        row.attrs.retain(|name, _| output_columns.iter().any(|o| o == name));
    }
    table.columns = output_columns;

    if summary.dropped_columns > 0 {
        log::debug!(
            "[{}] dropped {} unmapped source column(s)",
            descriptor.name,
            summary.dropped_columns
        );
    }
    summary
}
