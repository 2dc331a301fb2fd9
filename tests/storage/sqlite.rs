//! SqliteLocalStore tests — schema, id assignment, and CRUD transactions.

use serde_json::json;

use wirestore::error::{LocalError, StoreError};
use wirestore::storage::sqlite::SqliteLocalStore;
use wirestore::storage::traits::LocalStore;

fn store() -> SqliteLocalStore {
    SqliteLocalStore::open_in_memory().unwrap()
}

#[test]
fn add_assigns_an_id_when_missing() {
    let store = store();
    let id = store
        .add("cuttingRecords", &json!({"wireType": "14 AWG"}))
        .unwrap();
    assert!(!id.is_empty());

    let record = store.get("cuttingRecords", &id).unwrap().unwrap();
    assert_eq!(record["wireType"], "14 AWG");
    assert_eq!(record["id"], id.as_str());
}

#[test]
fn add_keeps_a_caller_supplied_id() {
    let store = store();
    let id = store
        .add("settings", &json!({"id": "sync-queue", "queue": []}))
        .unwrap();
    assert_eq!(id, "sync-queue");
}

#[test]
fn add_rejects_a_duplicate_id() {
    let store = store();
    store.add("settings", &json!({"id": "theme"})).unwrap();
    let err = store.add("settings", &json!({"id": "theme"})).unwrap_err();
    assert!(matches!(err, StoreError::Local(LocalError::Sqlite(_))));
}

#[test]
fn get_returns_none_for_missing_records() {
    let store = store();
    assert_eq!(store.get("cuttingRecords", "nope").unwrap(), None);
}

#[test]
fn get_all_returns_records_in_insertion_order() {
    let store = store();
    for n in 0..3 {
        store
            .add("inventoryRecords", &json!({"id": format!("i-{n}"), "n": n}))
            .unwrap();
    }
    let all = store.get_all("inventoryRecords").unwrap();
    assert_eq!(all.len(), 3);
    assert_eq!(all[0]["id"], "i-0");
    assert_eq!(all[2]["id"], "i-2");
}

#[test]
fn collections_are_isolated() {
    let store = store();
    store.add("cuttingRecords", &json!({"id": "a"})).unwrap();
    assert!(store.get_all("inventoryRecords").unwrap().is_empty());
    assert_eq!(store.get("inventoryRecords", "a").unwrap(), None);
}

#[test]
fn update_upserts_by_id() {
    let store = store();
    store
        .update("settings", &json!({"id": "theme", "value": "dark"}))
        .unwrap();
    store
        .update("settings", &json!({"id": "theme", "value": "light"}))
        .unwrap();

    let record = store.get("settings", "theme").unwrap().unwrap();
    assert_eq!(record["value"], "light");
    assert_eq!(store.get_all("settings").unwrap().len(), 1);
}

#[test]
fn update_requires_an_id() {
    let store = store();
    let err = store.update("settings", &json!({"value": "dark"})).unwrap_err();
    assert!(matches!(
        err,
        StoreError::Local(LocalError::MissingId { .. })
    ));
    assert!(err.to_string().contains("id"));
}

#[test]
fn delete_removes_only_the_keyed_record() {
    let store = store();
    store.add("cuttingRecords", &json!({"id": "a"})).unwrap();
    store.add("cuttingRecords", &json!({"id": "b"})).unwrap();

    store.delete("cuttingRecords", "a").unwrap();
    assert_eq!(store.get("cuttingRecords", "a").unwrap(), None);
    assert!(store.get("cuttingRecords", "b").unwrap().is_some());

    // Deleting an absent record is not an error.
    store.delete("cuttingRecords", "a").unwrap();
}

#[test]
fn clear_empties_one_collection() {
    let store = store();
    store.add("cuttingRecords", &json!({"id": "a"})).unwrap();
    store.add("notifications", &json!({"id": "n"})).unwrap();

    store.clear("cuttingRecords").unwrap();
    assert!(store.get_all("cuttingRecords").unwrap().is_empty());
    assert_eq!(store.get_all("notifications").unwrap().len(), 1);
}

#[test]
fn records_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("wirestore.db");
    let path = path.to_str().unwrap();

    {
        let store = SqliteLocalStore::open(path).unwrap();
        store
            .add("maintenanceLogs", &json!({"id": "daily_check", "completed": true}))
            .unwrap();
    }

    let store = SqliteLocalStore::open(path).unwrap();
    let record = store.get("maintenanceLogs", "daily_check").unwrap().unwrap();
    assert_eq!(record["completed"], true);
}
