// SeaOrmRepository against in-memory SQLite.

mod common;

use common::{input, setup_test_db, widget_type};
use modelkit::database::{Direction, Operator};
use modelkit::model::{Entity, LifecycleEvent, ModelType, RelatedResult, Resolved, Store};
use modelkit::validation::ExistsChecker;
use modelkit::{Query, Repository, SeaOrmRepository};
use sea_orm::ConnectionTrait;
use serde_json::json;

#[tokio::test]
async fn test_insert_returns_stored_row() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let repository = SeaOrmRepository::new(db);

    let row = repository
        .insert("widgets", "id", &input(json!({"name": "bolt", "price": 0.25})))
        .await
        .unwrap();

    assert_eq!(
        serde_json::Value::Object(row),
        json!({"id": 1, "name": "bolt", "price": 0.25, "owner_id": null})
    );
}

#[tokio::test]
async fn test_fetch_count_update_delete() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let repository = SeaOrmRepository::new(db);
    for (name, price) in [("a", 1.0), ("b", 2.0), ("c", 3.0)] {
        repository
            .insert("widgets", "id", &input(json!({"name": name, "price": price})))
            .await
            .unwrap();
    }

    let query = Query::table("widgets")
        .where_op("price", Operator::Gt, json!(1.5))
        .order_by("price", Direction::Desc);
    let rows = repository.fetch(&query).await.unwrap();
    let names: Vec<_> = rows.iter().map(|row| row["name"].clone()).collect();
    assert_eq!(names, vec![json!("c"), json!("b")]);

    assert_eq!(repository.count(&query.clone().take(1)).await.unwrap(), 2);

    let updated = repository
        .update("widgets", "id", &json!(2), &input(json!({"name": "bee"})))
        .await
        .unwrap();
    assert_eq!(updated, 1);
    let first = repository.fetch_first(&query).await.unwrap().unwrap();
    assert_eq!(first["name"], json!("c"));

    assert_eq!(repository.delete("widgets", "id", &json!(3)).await.unwrap(), 1);
    assert_eq!(repository.delete("widgets", "id", &json!(3)).await.unwrap(), 0);
    assert_eq!(
        repository.count(&Query::table("widgets")).await.unwrap(),
        2
    );
}

#[tokio::test]
async fn test_null_condition_matches_is_null() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let repository = SeaOrmRepository::new(db);
    repository
        .insert("widgets", "id", &input(json!({"name": "owned", "owner_id": 1})))
        .await
        .unwrap();
    repository
        .insert("widgets", "id", &input(json!({"name": "orphan"})))
        .await
        .unwrap();

    let orphans = repository
        .fetch(&Query::table("widgets").where_eq("owner_id", json!(null)))
        .await
        .unwrap();
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0]["name"], json!("orphan"));
}

#[tokio::test]
async fn test_column_listing_in_table_order() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let repository = SeaOrmRepository::new(db);

    assert_eq!(
        repository.column_listing("widgets").await.unwrap(),
        vec!["id", "name", "price", "owner_id"]
    );
}

#[tokio::test]
async fn test_exists_checker() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let repository = SeaOrmRepository::new(db);

    assert!(repository.exists("users", "id", &json!(1)).await.unwrap());
    assert!(repository.exists("users", "name", &json!("bob")).await.unwrap());
    assert!(!repository.exists("users", "id", &json!(42)).await.unwrap());
}

#[tokio::test]
async fn test_restrict_to_columns_before_and_after_migration() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let store = Store::new(SeaOrmRepository::new(db.clone()));
    let gadgets = ModelType::builder("Gadget").table("gadgets").build();
    let data = input(json!({"name": "sprocket", "bogus": true}));

    let err = store.restrict_to_columns(&gadgets, &data).await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(err.to_string(), "Gadget table 'gadgets' has no columns.");

    db.execute_unprepared("CREATE TABLE gadgets (id INTEGER PRIMARY KEY, name TEXT)")
        .await
        .unwrap();

    let restricted = store.restrict_to_columns(&gadgets, &data).await.unwrap();
    assert_eq!(serde_json::Value::Object(restricted), json!({"name": "sprocket"}));
}

// ==========================================
// ENTITIES AGAINST SQLITE
// ==========================================

#[tokio::test]
async fn test_entity_lifecycle_and_relations() {
    let db = setup_test_db().await.expect("Failed to setup test database");
    let store = Store::new(SeaOrmRepository::new(db));
    let widgets = widget_type();
    assert_eq!(widgets.events().listeners(LifecycleEvent::Saving), 1);

    let mut widget = Entity::new(widgets.clone());
    widget.fill(&input(json!({"name": "gear", "owner_id": 1})));
    assert!(widget.save(&store).await.unwrap());
    assert_eq!(widget.key(), Some(&json!(1)));

    store
        .repository()
        .insert(
            "comments",
            "id",
            &input(json!({"widget_id": 1, "body": "nice"})),
        )
        .await
        .unwrap();

    let Resolved::Relation(RelatedResult::Many(comments)) =
        widget.resolve("comments", &store).await.unwrap()
    else {
        panic!("comments should resolve to a collection");
    };
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["body"], json!("nice"));

    let owner = widget.resolve("owner", &store).await.unwrap();
    assert_eq!(owner.into_value(), Some(json!({"id": 1, "name": "alice"})));

    let found = store.query(&widgets).find_or_fail(json!(1)).await.unwrap();
    assert!(found.exists());
    assert_eq!(found.attribute("name"), Some(&json!("gear")));

    let missing = store.query(&widgets).find_or_fail(json!(999)).await.unwrap_err();
    assert_eq!(missing.to_string(), "No query results for model [Widget] 999.");

    assert_eq!(store.query(&widgets).count().await.unwrap(), 1);
}
