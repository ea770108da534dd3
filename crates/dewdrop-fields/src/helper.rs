//! Helpers and their default callables.
//!
//! A helper is a rendering or processing step (table cell, CSV cell, sort
//! key) identified by a string id. A field may assign its own callable for
//! a helper; otherwise the helper derives a default from the field's kind.

use crate::field::{Field, FieldSource, HelperCallable};
use dewdrop_core::Value;
use dewdrop_schema::GenericType;
use std::sync::Arc;

/// A capability that can be resolved per field.
pub trait Helper {
    /// Identifier used to key field overrides.
    fn id(&self) -> &str;

    /// Default callable for `field`, when the helper has one for its kind.
    fn default_callable(&self, field: &Field) -> Option<HelperCallable>;
}

/// Display title joined in by the listing query for reference columns.
pub fn title_column_alias(column: &str) -> String {
    format!("{column}_title")
}

fn column_source(field: &Field) -> Option<(String, GenericType)> {
    match field.source() {
        FieldSource::Column {
            column,
            generic_type,
        } => Some((column.clone(), *generic_type)),
        FieldSource::Computed | FieldSource::Virtual => None,
    }
}

/// Text for a reference column: the joined title when present, else the key.
fn reference_text(row: &dewdrop_core::Row, column: &str) -> String {
    row.get_by_name(&title_column_alias(column))
        .filter(|v| !v.is_null())
        .or_else(|| row.get_by_name(column))
        .map(Value::to_display_string)
        .unwrap_or_default()
}

/// Table cell text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CellContent;

impl CellContent {
    pub const ID: &'static str = "table_cell.content";
}

impl Helper for CellContent {
    fn id(&self) -> &str {
        Self::ID
    }

    fn default_callable(&self, field: &Field) -> Option<HelperCallable> {
        let (column, kind) = column_source(field)?;
        Some(Arc::new(move |row| {
            let text = match kind {
                GenericType::Reference => reference_text(row, &column),
                GenericType::Boolean => match row.get_by_name(&column).and_then(Value::as_bool) {
                    Some(true) => "Yes".to_string(),
                    Some(false) => "No".to_string(),
                    None => String::new(),
                },
                _ => row
                    .get_by_name(&column)
                    .map(Value::to_display_string)
                    .unwrap_or_default(),
            };
            Value::Text(text)
        }))
    }
}

/// CSV cell text.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvCell;

impl CsvCell {
    pub const ID: &'static str = "csv.cell";
}

impl Helper for CsvCell {
    fn id(&self) -> &str {
        Self::ID
    }

    fn default_callable(&self, field: &Field) -> Option<HelperCallable> {
        let (column, kind) = column_source(field)?;
        Some(Arc::new(move |row| {
            let text = match kind {
                GenericType::Reference => reference_text(row, &column),
                GenericType::Boolean => match row.get_by_name(&column).and_then(Value::as_bool) {
                    Some(b) => u8::from(b).to_string(),
                    None => String::new(),
                },
                _ => row
                    .get_by_name(&column)
                    .map(Value::to_display_string)
                    .unwrap_or_default(),
            };
            Value::Text(text)
        }))
    }
}

/// Value used to order rows by a field.
#[derive(Debug, Clone, Copy, Default)]
pub struct SortKey;

impl SortKey {
    pub const ID: &'static str = "table_sort.key";
}

impl Helper for SortKey {
    fn id(&self) -> &str {
        Self::ID
    }

    fn default_callable(&self, field: &Field) -> Option<HelperCallable> {
        let (column, kind) = column_source(field)?;
        Some(Arc::new(move |row| match kind {
            GenericType::Reference => Value::Text(reference_text(row, &column).to_lowercase()),
            GenericType::Text => match row.get_by_name(&column) {
                Some(Value::Text(s)) => Value::Text(s.to_lowercase()),
                Some(other) => other.clone(),
                None => Value::Null,
            },
            _ => row.get_by_name(&column).cloned().unwrap_or(Value::Null),
        }))
    }
}
