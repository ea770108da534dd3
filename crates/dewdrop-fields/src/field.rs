//! Field definitions.

use crate::visibility::Permission;
use dewdrop_core::error::FieldError;
use dewdrop_core::{Error, Result, Row, Value};
use dewdrop_schema::inflect;
use dewdrop_schema::{GenericType, TableMetadata};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A per-helper callback: computes a value for one result row.
pub type HelperCallable = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Where a field's data comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldSource {
    /// Backed by a table column
    Column {
        /// Column name
        column: String,
        /// Coarse column type used for helper defaults
        generic_type: GenericType,
    },
    /// Derived from other columns by assigned callbacks
    Computed,
    /// No data of its own (action links, separators)
    Virtual,
}

/// A logical unit of display and edit behavior.
#[derive(Clone)]
pub struct Field {
    name: String,
    label: String,
    source: FieldSource,
    model: Option<String>,
    callbacks: HashMap<String, HelperCallable>,
    pub(crate) visible: Permission,
    pub(crate) sortable: Permission,
    pub(crate) filterable: Permission,
    pub(crate) editable: Permission,
}

fn default_label(name: &str) -> String {
    inflect::titleize(name.strip_suffix("_id").unwrap_or(name))
}

impl Field {
    fn with_source(name: impl Into<String>, source: FieldSource) -> Self {
        let name = name.into();
        let editable = match source {
            FieldSource::Column { .. } => Permission::Everyone,
            FieldSource::Computed | FieldSource::Virtual => Permission::Nobody,
        };
        let sortable = editable.clone();
        Self {
            label: default_label(&name),
            name,
            source,
            model: None,
            callbacks: HashMap::new(),
            visible: Permission::Everyone,
            sortable,
            filterable: editable.clone(),
            editable,
        }
    }

    /// A field with no backing column; behavior comes from assigned callbacks.
    pub fn custom(name: impl Into<String>) -> Self {
        Self::with_source(name, FieldSource::Virtual)
    }

    /// A field derived from other columns.
    pub fn computed(name: impl Into<String>) -> Self {
        Self::with_source(name, FieldSource::Computed)
    }

    /// A field backed by `column` of `meta`, owned by that table.
    #[allow(clippy::result_large_err)]
    pub fn from_column(meta: &TableMetadata, column: &str) -> Result<Self> {
        let col = meta.column(column).ok_or_else(|| {
            Error::Field(FieldError::UnknownField {
                field: format!("{}.{}", meta.name, column),
            })
        })?;
        let mut field = Self::with_source(
            column,
            FieldSource::Column {
                column: column.to_string(),
                generic_type: col.generic_type(),
            },
        );
        if col.identity {
            field.editable = Permission::Nobody;
        }
        field.model = Some(meta.name.clone());
        Ok(field)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn source(&self) -> &FieldSource {
        &self.source
    }

    /// Owning model (table) name, if any.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Backing column name for column fields.
    pub fn column(&self) -> Option<&str> {
        match &self.source {
            FieldSource::Column { column, .. } => Some(column),
            FieldSource::Computed | FieldSource::Virtual => None,
        }
    }

    pub fn generic_type(&self) -> Option<GenericType> {
        match &self.source {
            FieldSource::Column { generic_type, .. } => Some(*generic_type),
            FieldSource::Computed | FieldSource::Virtual => None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn set_label(&mut self, label: impl Into<String>) -> &mut Self {
        self.label = label.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Override the callable used by `helper_id` for this field.
    pub fn assign<F>(&mut self, helper_id: impl Into<String>, callable: F) -> &mut Self
    where
        F: Fn(&Row) -> Value + Send + Sync + 'static,
    {
        self.callbacks.insert(helper_id.into(), Arc::new(callable));
        self
    }

    /// This field's own callable for `helper_id`, if assigned.
    pub fn callable(&self, helper_id: &str) -> Option<HelperCallable> {
        self.callbacks.get(helper_id).cloned()
    }

    pub fn has_callable(&self, helper_id: &str) -> bool {
        self.callbacks.contains_key(helper_id)
    }

    pub fn set_visible(&mut self, permission: Permission) -> &mut Self {
        self.visible = permission;
        self
    }

    pub fn set_sortable(&mut self, permission: Permission) -> &mut Self {
        self.sortable = permission;
        self
    }

    pub fn set_filterable(&mut self, permission: Permission) -> &mut Self {
        self.filterable = permission;
        self
    }

    pub fn set_editable(&mut self, permission: Permission) -> &mut Self {
        self.editable = permission;
        self
    }

    pub fn visible(&self) -> &Permission {
        &self.visible
    }

    pub fn sortable(&self) -> &Permission {
        &self.sortable
    }

    pub fn filterable(&self) -> &Permission {
        &self.filterable
    }

    pub fn editable(&self) -> &Permission {
        &self.editable
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut helpers: Vec<&str> = self.callbacks.keys().map(String::as_str).collect();
        helpers.sort_unstable();
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("source", &self.source)
            .field("model", &self.model)
            .field("callbacks", &helpers)
            .field("visible", &self.visible)
            .finish_non_exhaustive()
    }
}
