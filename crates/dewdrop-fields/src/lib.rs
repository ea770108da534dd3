//! Field registry for Dewdrop listings and forms.
//!
//! A [`Field`] is one logical column of an admin screen: a table column, a
//! computed value, or a virtual slot such as an action link. [`Fields`]
//! keeps them in registration order, organizes them into groups, resolves
//! per-field [`Helper`] callables, and narrows the set by permission and
//! [`VisibilityFilter`].

pub mod field;
pub mod fields;
pub mod helper;
pub mod visibility;

pub use field::{Field, FieldSource, HelperCallable};
pub use fields::{FieldGroupMut, Fields};
pub use helper::{CellContent, CsvCell, Helper, SortKey, title_column_alias};
pub use visibility::{FieldPredicate, Permission, VisibilityFilter};
