//! End-to-end scenarios across the registry, the set service and both stores

use std::sync::Arc;
use std::thread;

use custom_api_schemas::{
    FileStore, Item, MemoryStore, NewDataSet, NewSchema, Scope, SchemaError, SchemaRegistry,
    SchemaType, SetService, SharedStore,
};
use serde_json::{json, Value};
use tempfile::tempdir;

fn item(value: Value) -> Item {
    value.as_object().cloned().unwrap()
}

fn services(store: SharedStore) -> (SchemaRegistry, SetService) {
    (SchemaRegistry::new(store.clone()), SetService::new(store))
}

#[test]
fn tree_item_lifecycle() {
    let (registry, sets) = services(Arc::new(MemoryStore::new()));
    let schema = registry.create(NewSchema::new("abc-tree", SchemaType::Tree), "admin").unwrap();

    let set = sets
        .create_set(
            NewDataSet::new("ABC", &schema.id, Scope::System, json!({ "items": [{ "id": "ABC", "path": "ABC" }] })),
            "admin",
        )
        .unwrap();
    assert_eq!(set.item_count(), 1);

    let set = sets
        .add_item(
            &set.id,
            item(json!({ "id": "ABC.X1", "path": "ABC.X1", "parent_id": "ABC" })),
            "admin",
        )
        .unwrap();
    assert_eq!(set.item_count(), 2);

    let set = sets
        .update_item(&set.id, "ABC.X1", item(json!({ "value": "v2" })), "admin")
        .unwrap();
    assert_eq!(set.find_item("ABC.X1").unwrap()["value"], json!("v2"));
    assert_eq!(set.find_item("ABC.X1").unwrap()["parent_id"], json!("ABC"));

    let set = sets.remove_item(&set.id, "ABC.X1", "admin").unwrap();
    assert_eq!(set.item_count(), 1);
    assert_eq!(sets.get_by_id(&set.id, "admin").unwrap().item_count(), 1);
}

#[test]
fn user_scoped_set_is_private_to_owner() {
    let (registry, sets) = services(Arc::new(MemoryStore::new()));
    let schema = registry.create(NewSchema::new("notes", SchemaType::List), "admin").unwrap();
    let set = sets
        .create_set(NewDataSet::new("x-notes", &schema.id, Scope::User, json!({ "items": [] })), "user-x")
        .unwrap();

    let err = sets.get_by_id(&set.id, "user-y").unwrap_err();
    assert!(matches!(err, SchemaError::Forbidden { .. }));
    assert_eq!(err.status_code(), 403);

    assert_eq!(sets.get_by_id(&set.id, "user-x").unwrap().id, set.id);
}

#[test]
fn adding_the_same_item_twice_fails() {
    let (registry, sets) = services(Arc::new(MemoryStore::new()));
    let schema = registry.create(NewSchema::new("parts", SchemaType::List), "admin").unwrap();
    let set = sets
        .create_set(NewDataSet::new("parts", &schema.id, Scope::System, json!({ "items": [] })), "admin")
        .unwrap();

    sets.add_item(&set.id, item(json!({ "id": "p-1" })), "admin").unwrap();
    let err = sets.add_item(&set.id, item(json!({ "id": "p-1" })), "admin").unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateItem { .. }));
    assert_eq!(err.status_code(), 400);
}

#[test]
fn concurrent_adds_of_one_id_store_it_once() {
    let (registry, sets) = services(Arc::new(MemoryStore::new()));
    let schema = registry.create(NewSchema::new("parts", SchemaType::List), "admin").unwrap();
    let set = sets
        .create_set(NewDataSet::new("parts", &schema.id, Scope::System, json!({ "items": [] })), "admin")
        .unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let sets = sets.clone();
            let set_id = set.id.clone();
            thread::spawn(move || sets.add_item(&set_id, item(json!({ "id": "same" })), "admin").is_ok())
        })
        .collect();

    let successes = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(successes, 1);
    assert_eq!(sets.get_by_id(&set.id, "admin").unwrap().item_count(), 1);
}

#[test]
fn file_store_persists_across_reopen() {
    let dir = tempdir().unwrap();

    let (schema_id, set_id) = {
        let (registry, sets) = services(Arc::new(FileStore::open(dir.path()).unwrap()));
        let new: NewSchema = serde_json::from_str(include_str!("fixtures/service_graph_schema.json")).unwrap();
        let schema = registry.create(new, "admin").unwrap();
        let data: Value = serde_json::from_str(include_str!("fixtures/service_items.json")).unwrap();
        let set = sets
            .create_set(NewDataSet::new("services", &schema.id, Scope::System, data), "admin")
            .unwrap();
        sets.add_item(&set.id, item(json!({ "id": "ota", "name": "OTA" })), "admin").unwrap();
        (schema.id, set.id)
    };

    let (registry, sets) = services(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert_eq!(registry.get_by_code("SERVICES").unwrap().id, schema_id);

    let set = sets.get_by_id(&set_id, "anyone").unwrap();
    assert_eq!(set.item_count(), 4);
    assert_eq!(set.updated_by.as_deref(), Some("admin"));

    let err = registry
        .create(NewSchema::new("services", SchemaType::List), "admin")
        .unwrap_err();
    assert!(matches!(err, SchemaError::DuplicateCode { .. }));
}

#[test]
fn renaming_a_schema_updates_its_sets() {
    let dir = tempdir().unwrap();
    let (registry, sets) = services(Arc::new(FileStore::open(dir.path()).unwrap()));
    let schema = registry.create(NewSchema::new("old-name", SchemaType::List), "admin").unwrap();
    let set = sets
        .create_set(NewDataSet::new("s", &schema.id, Scope::System, json!({ "items": [] })), "admin")
        .unwrap();

    let patch = custom_api_schemas::SchemaPatch {
        code: Some("New-Name".into()),
        ..Default::default()
    };
    registry.update(&schema.id, patch, "admin").unwrap();

    assert_eq!(sets.list_sets("admin", Some("new-name")).unwrap().len(), 1);
    assert!(sets.list_sets("admin", Some("old-name")).unwrap().is_empty());

    let reopened = SetService::new(Arc::new(FileStore::open(dir.path()).unwrap()));
    assert_eq!(reopened.get_by_id(&set.id, "admin").unwrap().schema_code, "new-name");
}

#[test]
fn failed_file_write_leaves_set_unchanged() {
    let dir = tempdir().unwrap();
    let (registry, sets) = services(Arc::new(FileStore::open(dir.path()).unwrap()));
    let schema = registry.create(NewSchema::new("parts", SchemaType::List), "admin").unwrap();
    let set = sets
        .create_set(NewDataSet::new("parts", &schema.id, Scope::System, json!({ "items": [{ "id": "p-1" }] })), "admin")
        .unwrap();

    std::fs::remove_dir_all(dir.path().join("sets")).unwrap();

    let err = sets.add_item(&set.id, item(json!({ "id": "p-2" })), "admin").unwrap_err();
    assert_eq!(err.status_code(), 500);

    let stored = sets.get_by_id(&set.id, "admin").unwrap();
    assert_eq!(stored.item_count(), 1);
    assert!(stored.find_item("p-2").is_none());
}
