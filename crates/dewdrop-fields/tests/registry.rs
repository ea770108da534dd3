//! Registry behavior as an admin screen uses it.

use dewdrop_core::{Error, Row, UserContext, Value};
use dewdrop_fields::{CellContent, CsvCell, Field, Fields, Permission, VisibilityFilter};
use dewdrop_schema::{ColumnMetadata, TableMetadata};

fn orders() -> TableMetadata {
    TableMetadata::new(
        "orders",
        vec![
            ColumnMetadata::new("id", "INTEGER").primary_key(1).identity(),
            ColumnMetadata::new("customer_id", "INTEGER").references("customers", "id"),
            ColumnMetadata::new("qty", "INTEGER"),
            ColumnMetadata::new("unit_price", "INTEGER"),
            ColumnMetadata::new("paid", "BOOLEAN"),
        ],
    )
}

fn build_fields(meta: &TableMetadata) -> Fields {
    let mut fields = Fields::new();
    for column in meta.column_names() {
        fields.group_mut("details").add(Field::from_column(meta, &column).unwrap()).unwrap();
    }
    fields
        .group_mut("totals")
        .add(Field::computed("total"))
        .unwrap()
        .set_visible(Permission::roles(["accounting"]))
        .assign(CellContent::ID, |row: &Row| {
            let qty = row.get_by_name("qty").and_then(Value::as_i64).unwrap_or(0);
            let price = row.get_by_name("unit_price").and_then(Value::as_i64).unwrap_or(0);
            Value::Text((qty * price).to_string())
        });
    fields
}

fn sample_row() -> Row {
    Row::new(
        vec![
            "id".into(),
            "customer_id".into(),
            "customer_id_title".into(),
            "qty".into(),
            "unit_price".into(),
            "paid".into(),
        ],
        vec![
            Value::Int(10),
            Value::Int(3),
            Value::Text("Ada".into()),
            Value::Int(2),
            Value::Int(25),
            Value::Bool(false),
        ],
    )
}

#[test]
fn listing_cells_resolve_through_registry() {
    let meta = orders();
    let fields = build_fields(&meta);
    let accountant = UserContext::with_roles(["accounting"]);
    let row = sample_row();

    let cells: Vec<String> = fields
        .visible_fields(&accountant, &VisibilityFilter::excluding(["id"]))
        .into_iter()
        .map(|f| {
            let callable = fields.helper_callable(&CellContent, f.name()).unwrap();
            callable(&row).to_display_string()
        })
        .collect();
    assert_eq!(cells, ["Ada", "2", "25", "No", "50"]);
}

#[test]
fn computed_field_hidden_and_not_exportable_by_default() {
    let meta = orders();
    let fields = build_fields(&meta);
    let clerk = UserContext::anonymous();

    let visible: Vec<&str> = fields
        .visible_fields(&clerk, &VisibilityFilter::All)
        .into_iter()
        .map(Field::name)
        .collect();
    assert!(!visible.contains(&"total"));

    let err = fields.helper_callable(&CsvCell, "total").err().unwrap();
    assert!(matches!(err, Error::Field(_)));
}

#[test]
fn groups_share_registry_entries() {
    let meta = orders();
    let mut fields = build_fields(&meta);
    assert_eq!(fields.len(), 6);
    assert_eq!(fields.group("details").count(), 5);

    fields.group_mut("summary").add_existing("total").unwrap();
    assert!(fields.group_mut("totals").remove("total"));
    assert!(fields.has("total"));
    assert_eq!(fields.group("summary").count(), 1);

    fields.remove("total");
    assert_eq!(fields.group("summary").count(), 0);
    assert!(fields.ungrouped().is_empty());
}
