//! `spec.md` §8, scenario 6: an order priority with a nulls policy places
//! null-valued items first or last depending on that policy, independent of
//! where they land in insertion order.

mod common;

use std::sync::Arc;

use common::{Aged, InMemoryFetchers};
use ripple::{CollectionRequest, EntityConfig, EntityStore, IdGetter, Nulls, OrderBy, PropertyGetter};

fn store(rows: Vec<Aged>) -> Arc<EntityStore<Aged>> {
    let config = Arc::new(EntityConfig::new("aged", IdGetter::field("id"), Arc::new(InMemoryFetchers::new(rows))));
    EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator)
}

#[tokio::test]
async fn nulls_first_sorts_null_valued_items_ahead_of_everything() {
    let store = store(vec![
        Aged { id: "1".into(), age: Some(30) },
        Aged { id: "2".into(), age: None },
        Aged { id: "3".into(), age: Some(25) },
    ]);

    let order = vec![OrderBy::new(PropertyGetter::field("age")).nulls(Nulls::First)];
    let collection = store.get_collection(CollectionRequest { filter: None, order, meta: None }).unwrap();
    collection.progress().await;

    let ids: Vec<String> = collection.items_snapshot().iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["2", "3", "1"]);
}

#[tokio::test]
async fn nulls_last_sorts_null_valued_items_after_everything() {
    let store = store(vec![
        Aged { id: "1".into(), age: Some(30) },
        Aged { id: "2".into(), age: None },
        Aged { id: "3".into(), age: Some(25) },
    ]);

    let order = vec![OrderBy::new(PropertyGetter::field("age")).nulls(Nulls::Last)];
    let collection = store.get_collection(CollectionRequest { filter: None, order, meta: None }).unwrap();
    collection.progress().await;

    let ids: Vec<String> = collection.items_snapshot().iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
}

#[tokio::test]
async fn descending_order_reverses_non_null_comparison_but_not_nulls_placement() {
    let store = store(vec![
        Aged { id: "1".into(), age: Some(30) },
        Aged { id: "2".into(), age: None },
        Aged { id: "3".into(), age: Some(25) },
    ]);

    let order = vec![OrderBy::new(PropertyGetter::field("age")).desc().nulls(Nulls::First)];
    let collection = store.get_collection(CollectionRequest { filter: None, order, meta: None }).unwrap();
    collection.progress().await;

    let ids: Vec<String> = collection.items_snapshot().iter().map(|a| a.id.clone()).collect();
    assert_eq!(ids, vec!["2", "1", "3"]);
}
