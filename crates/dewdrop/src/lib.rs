//! Dewdrop - database-metadata-driven admin scaffolding.
//!
//! Dewdrop reads a table's catalog metadata and builds the pieces of an
//! admin screen from it:
//!
//! - [`Table`] and [`TableRow`] for finding, creating, updating and deleting rows
//! - [`Select`] listing queries with joined reference titles
//! - [`ManyToManyRelationship`] for junction-table edits saved in one transaction
//! - [`OptionPairs`] / [`OptionGroups`] for select inputs
//! - [`Listing`] for table rendering, sorting and CSV export
//!
//! # Quick Start
//!
//! ```ignore
//! use dewdrop::prelude::*;
//!
//! async fn edit_product(
//!     ctx: &RequestContext<'_>,
//!     cx: &Cx,
//!     conn: &impl Connection,
//!     cache: &MetadataCache,
//! ) {
//!     let products = match Table::init(ctx, cx, conn, cache, "products").await {
//!         Outcome::Ok(t) => t.has_many("tags", "product_tags"),
//!         _ => return,
//!     };
//!
//!     let mut row = products.create_row();
//!     row.set("name", "Desk Lamp").unwrap();
//!     row.save(cx, conn).await;
//!
//!     let tags = products.many_to_many(cx, conn, cache, "tags").await;
//!     if let Outcome::Ok(tags) = tags {
//!         let key = row.primary_key_values().remove(0);
//!         let current = vec![Value::Int(1), Value::Int(4)];
//!         tags.save(cx, conn, &key, None, Some(current)).await;
//!     }
//! }
//! ```

pub mod listing;
pub mod many_to_many;
pub mod options;
pub mod row;
pub mod select;
pub mod table;

pub use listing::{Listing, RenderedTable, csv_escape};
pub use many_to_many::{LinkOp, ManyToManyRelationship};
pub use options::{OptionGroup, OptionGroups, OptionPair, OptionPairs};
pub use row::{RowState, TableRow};
pub use select::{Select, SortDirection};
pub use table::{MAIN_ALIAS, Relationship, Table};

pub use dewdrop_core::{
    Changes, Config, Connection, Cx, Dialect, Error, HostEnvironment, Outcome, RequestContext,
    Result, Row, SessionStore, StaticEnvironment, TransactionOps, UserContext, Value,
};
pub use dewdrop_fields::{
    CellContent, CsvCell, Field, FieldSource, Fields, Helper, Permission, SortKey,
    VisibilityFilter,
};
pub use dewdrop_schema::{ColumnMetadata, MetadataCache, TableMetadata};

/// Common imports for building admin screens.
pub mod prelude {
    pub use crate::{
        Changes, ColumnMetadata, Connection, Cx, Error, Field, Fields, Listing,
        ManyToManyRelationship, MetadataCache, OptionGroups, OptionPairs, Outcome, Permission,
        RequestContext, Result, Row, Select, SortDirection, Table, TableMetadata, TableRow,
        UserContext, Value, VisibilityFilter,
    };
}
