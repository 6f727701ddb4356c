//! `spec.md` §8, scenario 1 ("repository round-trip") and scenario 2
//! ("delete propagation"): an item query's mutation is visible from a
//! sibling collection query after the next fan-out, and the entity store
//! emits the matching event exactly once.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use common::{InMemoryFetchers, Widget};
use ripple::{CollectionRequest, EntityConfig, EntityId, EntityStore, EntityStoreEvent, IdGetter};

fn store(rows: Vec<Widget>) -> Arc<EntityStore<Widget>> {
    let config = Arc::new(EntityConfig::new("widget", IdGetter::field("id"), Arc::new(InMemoryFetchers::new(rows))));
    EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator)
}

#[tokio::test]
async fn item_update_is_visible_in_sibling_collection_with_one_item_updated_event() {
    let store = store(vec![
        Widget { id: "1".into(), name: "A".into(), value: 1 },
        Widget { id: "2".into(), name: "B".into(), value: 2 },
    ]);

    let updated_count = Arc::new(AtomicUsize::new(0));
    let counter = updated_count.clone();
    let _sub = store.events().on(move |ev| {
        if matches!(ev, EntityStoreEvent::ItemUpdated { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let collection = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    collection.progress().await;
    assert_eq!(collection.len(), 2);

    let item = store.get_item(EntityId::from("2"));
    item.progress().await;
    item.update(Widget { id: "2".into(), name: "B*".into(), value: 20 }, false).await.unwrap();

    // The bus defers dispatch to the next runtime tick.
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let found = collection.get_by_id(&EntityId::from("2")).unwrap();
    assert_eq!(found.name, "B*");
    assert_eq!(found.value, 20);
    assert_eq!(updated_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn item_delete_removes_from_sibling_collection_with_one_itemdeleted_event() {
    let store = store(vec![Widget { id: "1".into(), name: "A".into(), value: 1 }]);

    let deleted_count = Arc::new(AtomicUsize::new(0));
    let counter = deleted_count.clone();
    let _sub = store.events().on(move |ev| {
        if matches!(ev, EntityStoreEvent::ItemDeleted { .. }) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let collection = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    collection.progress().await;

    let item = store.get_item(EntityId::from("1"));
    item.progress().await;
    item.delete(false).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    assert_eq!(collection.len(), 0);
    assert_eq!(deleted_count.load(Ordering::SeqCst), 1);
    assert_eq!(item.state(), ripple::ItemState::Deleted);
}
