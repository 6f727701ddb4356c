//! `spec.md` §8, scenario 3: an external push (`updateMixed`, as the root
//! store would route from an out-of-scope event stream) fans out with no
//! originator to skip.

mod common;

use std::sync::Arc;

use common::{InMemoryFetchers, Widget};
use ripple::{CollectionRequest, EntityConfig, EntityId, EntityStore, IdGetter};

fn store(rows: Vec<Widget>) -> Arc<EntityStore<Widget>> {
    let config = Arc::new(EntityConfig::new("widget", IdGetter::field("id"), Arc::new(InMemoryFetchers::new(rows))));
    EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator)
}

#[tokio::test]
async fn update_mixed_adds_and_removes_in_one_atomic_batch() {
    let store = store(vec![
        Widget { id: "1".into(), name: "one".into(), value: 1 },
        Widget { id: "2".into(), name: "two".into(), value: 2 },
    ]);

    let collection = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    collection.progress().await;
    assert_eq!(collection.len(), 2);

    store.update_mixed(vec![Widget { id: "3".into(), name: "three".into(), value: 3 }], vec![EntityId::from("1")]);

    let ids: Vec<String> = collection.items_snapshot().iter().map(|w| w.id.clone()).collect();
    assert_eq!(ids, vec!["2", "3"]);
}

#[tokio::test]
async fn external_updates_and_deletes_skip_no_originator() {
    let store = store(vec![Widget { id: "1".into(), name: "one".into(), value: 1 }]);
    let collection = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    collection.progress().await;

    // An item query for the same id must see the external push too - there
    // is no originator to exempt it from.
    let item = store.get_item(EntityId::from("1"));
    item.progress().await;

    store.update_one(Widget { id: "1".into(), name: "one*".into(), value: 11 });
    assert_eq!(item.data().unwrap().name, "one*");
    assert_eq!(collection.get_by_id(&EntityId::from("1")).unwrap().name, "one*");

    store.delete_one(EntityId::from("1"));
    assert_eq!(item.state(), ripple::ItemState::Deleted);
    assert_eq!(collection.len(), 0);
}
