//! Junction resolution, many-to-many saves, and the listing query.

mod common;

use common::{
    guest, prefixed_shop_schema, row, run, seeded, shop_schema, unwrap_err, unwrap_outcome,
};
use dewdrop::{
    ColumnMetadata, Config, Error, Outcome, RequestContext, StaticEnvironment, Table,
    TableMetadata, UserContext, Value,
};
use dewdrop_core::RelationshipErrorKind;

fn relationship_kind(err: &Error) -> Option<RelationshipErrorKind> {
    match err {
        Error::Relationship(r) => Some(r.kind()),
        _ => None,
    }
}

#[test]
fn junction_detected_from_related_table() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "tags");

        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);
        assert_eq!(tags.junction_table, "product_tags");
        assert_eq!(tags.source_column, "product_id");
        assert_eq!(tags.reference_table, "tags");
        assert_eq!(tags.reference_column, "tag_id");
        assert_eq!(tags.reference_pk, "id");
    });
}

#[test]
fn junction_named_directly_skips_catalog_scan() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");

        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);
        assert_eq!(tags.junction_table, "product_tags");
        assert!(conn.statements().is_empty());
    });
}

#[test]
fn ambiguous_and_undeclared_relationships_fail() {
    run(|cx| async move {
        let mut schema = shop_schema();
        schema.push(TableMetadata::new(
            "featured_tags",
            vec![
                ColumnMetadata::new("product_id", "INTEGER").references("products", "id"),
                ColumnMetadata::new("tag_id", "INTEGER").references("tags", "id"),
            ],
        ));
        let (conn, cache) = seeded(schema);
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "tags");

        let err = unwrap_err(products.many_to_many(&cx, &conn, &cache, "tags").await);
        assert_eq!(
            relationship_kind(&err),
            Some(RelationshipErrorKind::AmbiguousRelationship)
        );
        match &err {
            Error::Relationship(r) => assert!(r.remediation().contains("has_many")),
            other => panic!("unexpected error: {other:?}"),
        }

        let err = unwrap_err(products.many_to_many(&cx, &conn, &cache, "colors").await);
        assert_eq!(
            relationship_kind(&err),
            Some(RelationshipErrorKind::AmbiguousRelationship)
        );
    });
}

#[test]
fn save_applies_changes_in_one_transaction() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let changes = unwrap_outcome(
            tags.save(
                &cx,
                &conn,
                &Value::Int(7),
                Some(vec![Value::Int(1), Value::Int(2)]),
                Some(vec![Value::Text("2".into()), Value::Int(3)]),
            )
            .await,
        );
        assert_eq!(changes.removals(), [Value::Int(1)]);
        assert_eq!(changes.additions(), [Value::Int(3)]);

        let log = conn.lock().log.clone();
        let statements: Vec<&str> = log.iter().map(|(sql, _)| sql.as_str()).collect();
        assert_eq!(
            statements,
            [
                "BEGIN",
                r#"DELETE FROM "product_tags" WHERE "product_id" = ?1 AND "tag_id" = ?2"#,
                r#"INSERT INTO "product_tags" ("product_id", "tag_id") VALUES (?1, ?2)"#,
                "COMMIT",
            ]
        );
        assert_eq!(log[1].1, vec![Value::Int(7), Value::Int(1)]);
        assert_eq!(log[2].1, vec![Value::Int(7), Value::Int(3)]);
    });
}

#[test]
fn unchanged_selection_writes_nothing() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let changes = unwrap_outcome(
            tags.save(
                &cx,
                &conn,
                &Value::Int(7),
                Some(vec![Value::Int(2), Value::Int(1)]),
                Some(vec![Value::Int(1), Value::Text("2".into())]),
            )
            .await,
        );
        assert!(changes.is_empty());
        assert!(conn.statements().is_empty());
    });
}

#[test]
fn failed_link_rolls_back() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        conn.fail_when("INSERT INTO \"product_tags\"");
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let err = unwrap_err(
            tags.save(
                &cx,
                &conn,
                &Value::Int(7),
                Some(vec![Value::Int(1)]),
                Some(vec![Value::Int(5)]),
            )
            .await,
        );
        match err {
            Error::SaveFailed(e) => {
                assert_eq!(e.table, "product_tags");
                assert!(e.is_constraint_violation());
            }
            other => panic!("unexpected error: {other:?}"),
        }
        let statements = conn.statements();
        assert_eq!(statements.first().map(String::as_str), Some("BEGIN"));
        assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
        assert!(!statements.iter().any(|s| s == "COMMIT"));
    });
}

#[test]
fn panicked_link_rolls_back() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        conn.panic_when("DELETE FROM \"product_tags\"");
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let outcome = tags
            .save(
                &cx,
                &conn,
                &Value::Int(7),
                Some(vec![Value::Int(1)]),
                Some(vec![Value::Int(5)]),
            )
            .await;
        assert!(matches!(outcome, Outcome::Panicked(_)));
        assert_eq!(
            conn.statements(),
            [
                "BEGIN",
                r#"DELETE FROM "product_tags" WHERE "product_id" = ?1 AND "tag_id" = ?2"#,
                "ROLLBACK",
            ]
        );
    });
}

#[test]
fn initial_value_reads_junction() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        conn.respond(
            "FROM \"product_tags\"",
            vec![
                row(&["tag_id"], vec![Value::Int(1)]),
                row(&["tag_id"], vec![Value::Int(4)]),
            ],
        );
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let keys = unwrap_outcome(tags.load_initial_value(&cx, &conn, &Value::Int(7)).await);
        assert_eq!(keys, vec![Value::Int(1), Value::Int(4)]);
        assert_eq!(
            conn.statements(),
            [r#"SELECT "tag_id" FROM "product_tags" WHERE "product_id" = ?1 ORDER BY "tag_id""#]
        );
    });
}

#[test]
fn admin_listing_joins_titles_and_aggregates_tags() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags")
            .has_many("variants", "product_variants");

        let select = unwrap_outcome(products.select_admin_listing(&cx, &conn, &cache).await);
        let (sql, params) = select.build();
        assert!(params.is_empty());
        assert_eq!(
            sql,
            concat!(
                r#"SELECT "main".*, "ref_category_id"."name" AS "category_id_title", "#,
                r#"(SELECT group_concat("r_tags"."label", ', ') FROM "product_tags" AS "j_tags" "#,
                r#"JOIN "tags" AS "r_tags" ON "r_tags"."id" = "j_tags"."tag_id" "#,
                r#"WHERE "j_tags"."product_id" = "main"."id") AS "tags" "#,
                r#"FROM "products" AS "main" "#,
                r#"LEFT JOIN "categories" AS "ref_category_id" ON "ref_category_id"."id" = "main"."category_id""#,
            )
        );
    });
}

#[test]
fn text_keys_compare_as_text() {
    run(|cx| async move {
        let (conn, cache) = seeded(shop_schema());
        let products = unwrap_outcome(Table::init(&guest(), &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);

        let changes = unwrap_outcome(
            tags.save(
                &cx,
                &conn,
                &Value::Int(7),
                Some(vec![Value::Text("007".into()), Value::Text(" 3".into())]),
                Some(vec![Value::Text("7".into()), Value::Text(" 3".into())]),
            )
            .await,
        );
        assert_eq!(changes.removals(), [Value::Text("007".into())]);
        assert_eq!(changes.additions(), [Value::Text("7".into())]);
        assert_eq!(
            conn.statements(),
            [
                "BEGIN",
                r#"DELETE FROM "product_tags" WHERE "product_id" = ?1 AND "tag_id" = ?2"#,
                r#"INSERT INTO "product_tags" ("product_id", "tag_id") VALUES (?1, ?2)"#,
                "COMMIT",
            ]
        );
    });
}

#[test]
fn table_prefix_applies_to_table_and_declarations() {
    run(|cx| async move {
        let (conn, cache) = seeded(prefixed_shop_schema("wp_"));
        let config = Config {
            table_prefix: "wp_".to_string(),
            ..Config::default()
        };
        let env = StaticEnvironment::new(config, "/wp-admin");
        let user = UserContext::with_roles(["editor"]);
        let ctx = RequestContext::new(&env, &user);

        let products = unwrap_outcome(Table::init(&ctx, &cx, &conn, &cache, "products").await)
            .has_many("tags", "product_tags");
        assert_eq!(products.name(), "wp_products");

        let tags = unwrap_outcome(products.many_to_many(&cx, &conn, &cache, "tags").await);
        assert_eq!(tags.junction_table, "wp_product_tags");
        assert_eq!(tags.reference_table, "wp_tags");

        match unwrap_err(products.find(&cx, &conn, &[Value::Int(1)]).await) {
            Error::RowNotFound(e) => assert_eq!(e.table, "wp_products"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            conn.statements(),
            [r#"SELECT "main".* FROM "wp_products" AS "main" WHERE "main"."id" = ?1 LIMIT 1"#]
        );
    });
}
