//! The field registry and its groups.

use crate::field::{Field, HelperCallable};
use crate::helper::Helper;
use crate::visibility::VisibilityFilter;
use dewdrop_core::error::FieldError;
use dewdrop_core::{Error, Result, UserContext};
use dewdrop_schema::TableMetadata;
use std::collections::HashMap;

/// Ordered set of fields keyed by name, with named groups.
///
/// Iteration follows registration order. Groups hold field names only; a
/// field lives once in the registry however many groups list it.
#[derive(Debug, Clone, Default)]
pub struct Fields {
    order: Vec<String>,
    fields: HashMap<String, Field>,
    groups: Vec<(String, Vec<String>)>,
}

fn unknown_field(name: &str) -> Error {
    Error::Field(FieldError::UnknownField {
        field: name.to_string(),
    })
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `field`.
    ///
    /// Adding a field whose name and model match an already registered one
    /// is a no-op returning the existing field. Any other name clash fails
    /// with [`FieldError::DuplicateField`].
    #[allow(clippy::result_large_err)]
    pub fn add(&mut self, field: Field) -> Result<&mut Field> {
        let name = field.name().to_string();
        match self.fields.get(&name) {
            Some(existing) if existing.model() == field.model() => {
                tracing::trace!(field = %name, "field already registered");
            }
            Some(existing) => {
                return Err(Error::Field(FieldError::DuplicateField {
                    field: name,
                    existing_model: existing.model().map(str::to_string),
                    model: field.model().map(str::to_string),
                }));
            }
            None => {
                self.order.push(name.clone());
                self.fields.insert(name.clone(), field);
            }
        }
        self.fields.get_mut(&name).ok_or_else(|| unknown_field(&name))
    }

    /// Register a virtual field named `name`.
    #[allow(clippy::result_large_err)]
    pub fn add_custom(&mut self, name: impl Into<String>) -> Result<&mut Field> {
        self.add(Field::custom(name))
    }

    /// Register a field backed by `column` of `meta`.
    #[allow(clippy::result_large_err)]
    pub fn add_column(&mut self, meta: &TableMetadata, column: &str) -> Result<&mut Field> {
        self.add(Field::from_column(meta, column)?)
    }

    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Field> {
        self.fields.get_mut(name)
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Remove a field from the registry and from every group.
    pub fn remove(&mut self, name: &str) -> Option<Field> {
        let field = self.fields.remove(name)?;
        self.order.retain(|n| n != name);
        for (_, members) in &mut self.groups {
            members.retain(|n| n != name);
        }
        Some(field)
    }

    /// Fields in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Field> + '_ {
        self.order.iter().filter_map(|name| self.fields.get(name))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Write-through handle for the group `name`, created if missing.
    pub fn group_mut(&mut self, name: &str) -> FieldGroupMut<'_> {
        let index = match self.groups.iter().position(|(g, _)| g == name) {
            Some(index) => index,
            None => {
                self.groups.push((name.to_string(), Vec::new()));
                self.groups.len() - 1
            }
        };
        FieldGroupMut {
            fields: self,
            index,
        }
    }

    /// Fields of group `name` in group order; empty when the group is unknown.
    pub fn group<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Field> + use<'a> {
        let members = self
            .groups
            .iter()
            .find(|(g, _)| g == name)
            .map(|(_, members)| members.as_slice())
            .unwrap_or_default();
        members.iter().filter_map(|n| self.fields.get(n))
    }

    pub fn group_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.groups.iter().map(|(g, _)| g.as_str())
    }

    /// Fields that belong to no group, in registration order.
    pub fn ungrouped(&self) -> Vec<&Field> {
        self.iter()
            .filter(|f| {
                !self
                    .groups
                    .iter()
                    .any(|(_, members)| members.iter().any(|n| n == f.name()))
            })
            .collect()
    }

    /// Resolve the callable `helper` uses for field `field_name`.
    ///
    /// The field's own override wins, then the helper's default for the
    /// field's kind.
    #[allow(clippy::result_large_err)]
    pub fn helper_callable(&self, helper: &dyn Helper, field_name: &str) -> Result<HelperCallable> {
        let field = self.get(field_name).ok_or_else(|| unknown_field(field_name))?;
        if let Some(callable) = field.callable(helper.id()) {
            return Ok(callable);
        }
        helper.default_callable(field).ok_or_else(|| {
            Error::Field(FieldError::HelperCallableNotAvailableForField {
                field: field_name.to_string(),
                helper: helper.id().to_string(),
            })
        })
    }

    /// Fields `user` may see, narrowed by `filter`, in registration order.
    pub fn visible_fields(&self, user: &UserContext, filter: &VisibilityFilter) -> Vec<&Field> {
        self.iter()
            .filter(|f| f.visible().allows(user) && filter.allows(f, user))
            .collect()
    }

    pub fn sortable_fields(&self, user: &UserContext) -> Vec<&Field> {
        self.iter().filter(|f| f.sortable().allows(user)).collect()
    }

    pub fn filterable_fields(&self, user: &UserContext) -> Vec<&Field> {
        self.iter().filter(|f| f.filterable().allows(user)).collect()
    }

    pub fn editable_fields(&self, user: &UserContext) -> Vec<&Field> {
        self.iter().filter(|f| f.editable().allows(user)).collect()
    }
}

/// Mutable view of one group inside a [`Fields`] registry.
///
/// Adding through the group also registers the field with the parent.
/// Removing through the group only drops its membership.
#[derive(Debug)]
pub struct FieldGroupMut<'a> {
    fields: &'a mut Fields,
    index: usize,
}

impl FieldGroupMut<'_> {
    pub fn name(&self) -> &str {
        &self.fields.groups[self.index].0
    }

    fn members_mut(&mut self) -> &mut Vec<String> {
        &mut self.fields.groups[self.index].1
    }

    fn join(&mut self, name: &str) {
        let members = self.members_mut();
        if !members.iter().any(|n| n == name) {
            members.push(name.to_string());
        }
    }

    /// Register `field` with the parent and append it to this group.
    #[allow(clippy::result_large_err)]
    pub fn add(&mut self, field: Field) -> Result<&mut Field> {
        let name = field.name().to_string();
        self.fields.add(field)?;
        self.join(&name);
        self.fields.get_mut(&name).ok_or_else(|| unknown_field(&name))
    }

    /// Append an already registered field to this group.
    #[allow(clippy::result_large_err)]
    pub fn add_existing(&mut self, name: &str) -> Result<()> {
        if !self.fields.has(name) {
            return Err(unknown_field(name));
        }
        self.join(name);
        Ok(())
    }

    /// Drop `name` from this group; the parent registry keeps the field.
    pub fn remove(&mut self, name: &str) -> bool {
        let members = self.members_mut();
        let before = members.len();
        members.retain(|n| n != name);
        members.len() != before
    }

    pub fn has(&self, name: &str) -> bool {
        self.fields.groups[self.index].1.iter().any(|n| n == name)
    }

    pub fn names(&self) -> &[String] {
        &self.fields.groups[self.index].1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helper::{CellContent, SortKey};
    use crate::visibility::Permission;
    use dewdrop_core::{Row, Value};
    use dewdrop_schema::ColumnMetadata;

    fn products() -> TableMetadata {
        TableMetadata::new(
            "products",
            vec![
                ColumnMetadata::new("id", "INTEGER").primary_key(1).identity(),
                ColumnMetadata::new("name", "TEXT"),
                ColumnMetadata::new("price", "NUMERIC(10,2)"),
            ],
        )
    }

    #[test]
    fn test_add_is_idempotent_for_same_model() {
        let meta = products();
        let mut fields = Fields::new();
        fields.add_column(&meta, "name").unwrap().set_label("Product");
        fields.add_column(&meta, "name").unwrap();
        assert_eq!(fields.len(), 1);
        assert_eq!(fields.get("name").unwrap().label(), "Product");
    }

    #[test]
    fn test_add_duplicate_different_model_fails() {
        let meta = products();
        let mut fields = Fields::new();
        fields.add_column(&meta, "name").unwrap();
        let err = fields.add_custom("name").unwrap_err();
        match err {
            Error::Field(FieldError::DuplicateField {
                field,
                existing_model,
                model,
            }) => {
                assert_eq!(field, "name");
                assert_eq!(existing_model.as_deref(), Some("products"));
                assert_eq!(model, None);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_iteration_order_and_remove() {
        let mut fields = Fields::new();
        fields.add_custom("b").unwrap();
        fields.add_custom("a").unwrap();
        fields.add_custom("c").unwrap();
        fields.group_mut("main").add_existing("a").unwrap();

        let names: Vec<&str> = fields.iter().map(Field::name).collect();
        assert_eq!(names, ["b", "a", "c"]);

        assert!(fields.remove("a").is_some());
        assert!(!fields.has("a"));
        assert_eq!(fields.group("main").count(), 0);
        assert!(fields.remove("a").is_none());
    }

    #[test]
    fn test_group_write_through_and_scoped_remove() {
        let mut fields = Fields::new();
        {
            let mut main = fields.group_mut("main");
            main.add(Field::custom("title")).unwrap();
            main.add(Field::custom("body")).unwrap();
            assert_eq!(main.name(), "main");
        }
        fields.group_mut("sidebar").add_existing("title").unwrap();
        fields.add_custom("notes").unwrap();

        assert!(fields.has("title"));
        assert!(fields.group_mut("main").remove("title"));
        assert!(fields.has("title"));
        assert!(fields.group_mut("sidebar").has("title"));

        let main: Vec<&str> = fields.group("main").map(Field::name).collect();
        assert_eq!(main, ["body"]);
        let loose: Vec<&str> = fields.ungrouped().into_iter().map(Field::name).collect();
        assert_eq!(loose, ["notes"]);
        let groups: Vec<&str> = fields.group_names().collect();
        assert_eq!(groups, ["main", "sidebar"]);
        assert!(fields.group_mut("main").add_existing("missing").is_err());
    }

    #[test]
    fn test_helper_callable_fallback_chain() {
        let meta = products();
        let mut fields = Fields::new();
        fields.add_column(&meta, "name").unwrap();
        fields
            .add_custom("shout")
            .unwrap()
            .assign(CellContent::ID, |row: &Row| {
                let name = row.get_by_name("name").and_then(Value::as_str).unwrap_or("");
                Value::Text(name.to_uppercase())
            });

        let row = Row::new(vec!["name".into()], vec![Value::Text("Lamp".into())]);
        let default = fields.helper_callable(&CellContent, "name").unwrap();
        assert_eq!(default(&row), Value::Text("Lamp".into()));
        let custom = fields.helper_callable(&CellContent, "shout").unwrap();
        assert_eq!(custom(&row), Value::Text("LAMP".into()));

        let Err(err) = fields.helper_callable(&SortKey, "shout") else {
            panic!("a computed field has no default sort key");
        };
        assert!(matches!(
            err,
            Error::Field(FieldError::HelperCallableNotAvailableForField { ref field, ref helper })
                if field == "shout" && helper == "table_sort.key"
        ));
        assert!(fields.helper_callable(&SortKey, "missing").is_err());
    }

    #[test]
    fn test_permission_then_filter() {
        let meta = products();
        let mut fields = Fields::new();
        fields.add_column(&meta, "id").unwrap();
        fields.add_column(&meta, "name").unwrap();
        fields
            .add_column(&meta, "price")
            .unwrap()
            .set_visible(Permission::roles(["admin"]));

        let guest = UserContext::anonymous();
        let admin = UserContext::with_roles(["admin"]);

        let names = |v: Vec<&Field>| v.into_iter().map(|f| f.name().to_string()).collect::<Vec<_>>();
        assert_eq!(names(fields.visible_fields(&guest, &VisibilityFilter::All)), ["id", "name"]);
        assert_eq!(
            names(fields.visible_fields(&admin, &VisibilityFilter::excluding(["id"]))),
            ["name", "price"]
        );
        assert_eq!(
            names(fields.visible_fields(&guest, &VisibilityFilter::named(["price", "name"]))),
            ["name"]
        );
        assert_eq!(names(fields.editable_fields(&guest)), ["name", "price"]);
        assert_eq!(names(fields.sortable_fields(&guest)).len(), 3);
        assert_eq!(names(fields.filterable_fields(&guest)).len(), 3);
    }
}
