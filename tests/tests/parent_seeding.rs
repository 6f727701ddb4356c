//! `spec.md` §8, scenario 5: a new collection query whose filter is a
//! subset of an existing ready collection's filter is seeded from the
//! parent's items instead of triggering a second fetch.

mod common;

use std::sync::Arc;

use common::{InMemoryFetchers, Widget};
use ripple::{CollectionRequest, CollectionState, EntityConfig, FilterNode, IdGetter, PropertyGetter};

#[tokio::test]
async fn child_collection_seeds_from_ready_parent_without_a_fetch() {
    let rows = vec![
        Widget { id: "1".into(), name: "x".into(), value: 1 },
        Widget { id: "2".into(), name: "y".into(), value: 1 },
        Widget { id: "3".into(), name: "z".into(), value: 2 },
    ];
    let config = Arc::new(EntityConfig::new("widget", IdGetter::field("id"), Arc::new(InMemoryFetchers::new(rows))));
    let store = ripple::EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator);

    let parent_filter = FilterNode::operator("eq", PropertyGetter::field("value"), 1);
    let parent = store.get_collection(CollectionRequest { filter: Some(parent_filter), order: vec![], meta: None }).unwrap();
    parent.progress().await;
    assert!(parent.ready());
    assert_eq!(parent.len(), 2);

    let child_filter = FilterNode::and(vec![
        FilterNode::operator("eq", PropertyGetter::field("value"), 1),
        FilterNode::operator("eq", PropertyGetter::field("name"), "y"),
    ]);
    let child = store.get_collection(CollectionRequest { filter: Some(child_filter), order: vec![], meta: None }).unwrap();

    // Seeding is synchronous - no fetcher round trip, so no `progress().await` needed.
    assert_eq!(child.state(), CollectionState::Prefetched);
    let ids: Vec<String> = child.items_snapshot().iter().map(|w| w.id.clone()).collect();
    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn distinct_filters_each_get_their_own_instance() {
    let rows = vec![Widget { id: "1".into(), name: "x".into(), value: 1 }];
    let config = Arc::new(EntityConfig::new("widget", IdGetter::field("id"), Arc::new(InMemoryFetchers::new(rows))));
    let store = ripple::EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator);

    let a = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    let b = store
        .get_collection(CollectionRequest {
            filter: Some(FilterNode::operator("eq", PropertyGetter::field("value"), 1)),
            order: vec![],
            meta: None,
        })
        .unwrap();
    assert!(!Arc::ptr_eq(&a, &b));

    let c = store.get_collection(CollectionRequest { filter: None, order: vec![], meta: None }).unwrap();
    assert!(Arc::ptr_eq(&a, &c));
}
