//! Per-entity-type coordinator: deduplicates item and collection queries
//! behind weak-value indices, fans self-initiated mutations out to every
//! sibling query (except the one that originated the change), and keeps a
//! weak id→item index for seeding new queries without a network round trip.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use crate::collection_query::CollectionQuery;
use crate::config::EntityConfig;
use crate::error::Result;
use crate::events::{EntityStoreEvent, SelfChange};
use crate::id::EntityId;
use crate::item_query::ItemQuery;
use ripple_query::{
    default_operator_key, is_filter_subset, simplify, simplify_order_by, FilterNode, OperatorMap, OrderBy,
    PrimitiveComparator, SimplifiedFilter, SimplifiedOrderBy,
};
use ripple_signals::{Bus, Owner, WeakIndex};

/// Parameters for [`EntityStore::get_collection`], mirroring the fields a
/// caller supplies to `getCollection`.
pub struct CollectionRequest<E> {
    pub filter: Option<FilterNode<E>>,
    pub order: Vec<OrderBy<E>>,
    pub meta: Option<Value>,
}

pub struct EntityStore<E> {
    config: Arc<EntityConfig<E>>,
    operators: OperatorMap,
    primitive: PrimitiveComparator,
    index: WeakIndex<EntityId, E>,
    item_queries: WeakIndex<EntityId, ItemQuery<E>>,
    collections: WeakIndex<String, CollectionQuery<E>>,
    bus: Bus<EntityStoreEvent<E>>,
    owner: Owner<EntityStoreEvent<E>>,
}

impl<E> EntityStore<E>
where E: Clone + Serialize + Send + Sync + 'static
{
    pub fn new(config: Arc<EntityConfig<E>>, operators: OperatorMap, primitive: PrimitiveComparator) -> Arc<Self> {
        let (bus, owner) = Bus::new();
        let store = Arc::new(Self {
            config,
            operators,
            primitive,
            index: WeakIndex::new(),
            item_queries: WeakIndex::new(),
            collections: WeakIndex::new(),
            bus,
            owner,
        });
        store.emit(EntityStoreEvent::Initialized);
        store
    }

    pub fn name(&self) -> &str { &self.config.name }

    pub fn events(&self) -> Bus<EntityStoreEvent<E>> { self.bus.clone() }

    fn emit(&self, event: EntityStoreEvent<E>) { let _ = self.bus.emit(&self.owner, event); }

    fn sink_for(self: &Arc<Self>, originator_item: Option<EntityId>, originator_collection: Option<String>) -> crate::events::ChangeSink<E> {
        let store = self.clone();
        Arc::new(move |change: SelfChange<E>| match change {
            SelfChange::Upsert(item) => store.fan_out_upsert(item, originator_item.as_ref(), originator_collection.as_deref()),
            SelfChange::Delete(id) => store.fan_out_delete(id, originator_item.as_ref(), originator_collection.as_deref()),
        })
    }

    fn fan_out_upsert(&self, item: E, originator_item: Option<&EntityId>, originator_collection: Option<&str>) {
        let id = self.config.id_getter.get(&item);
        let is_new = self.index.get(&id).is_none();
        self.index.set(id.clone(), &Arc::new(item.clone()));

        if let Some(iq) = self.item_queries.get(&id) {
            if originator_item != Some(&id) {
                iq.set_one(item.clone());
            }
        }
        for (key, cq) in self.live_collections() {
            if originator_collection == Some(key.as_str()) {
                continue;
            }
            let _ = cq.set_one(item.clone());
        }

        if is_new {
            self.emit(EntityStoreEvent::ItemAdded { item: item.clone() });
        } else {
            self.emit(EntityStoreEvent::ItemUpdated { item });
        }
        self.emit(EntityStoreEvent::Updated);
    }

    fn fan_out_delete(&self, id: EntityId, originator_item: Option<&EntityId>, originator_collection: Option<&str>) {
        self.index.delete(&id);
        if let Some(iq) = self.item_queries.get(&id) {
            if originator_item != Some(&id) {
                iq.delete_one(&id);
            }
        }
        for (key, cq) in self.live_collections() {
            if originator_collection == Some(key.as_str()) {
                continue;
            }
            let _ = cq.delete_one(&id);
        }
        self.emit(EntityStoreEvent::ItemDeleted { id });
        self.emit(EntityStoreEvent::Deleted);
    }

    fn live_collections(&self) -> Vec<(String, Arc<CollectionQuery<E>>)> {
        self.collections.keys().into_iter().filter_map(|k| self.collections.get(&k).map(|v| (k, v))).collect()
    }

    /// Returns the cached item query for `id` if some caller still retains
    /// it, otherwise builds one - seeded from the entity index if `id` is
    /// already known, fetched otherwise.
    pub fn get_item(self: &Arc<Self>, id: EntityId) -> Arc<ItemQuery<E>> {
        if let Some(existing) = self.item_queries.get(&id) {
            return existing;
        }
        let sink = self.sink_for(Some(id.clone()), None);
        let query = match self.index.get(&id) {
            Some(item) => ItemQuery::from_prefetched(self.config.clone(), (*item).clone(), Some(sink)),
            None => ItemQuery::fetching(self.config.clone(), id.clone(), Some(sink)),
        };
        self.item_queries.set(id, &query);
        query
    }

    /// Builds a new item query in `Creating` state; never deduplicated (each
    /// call to `createItem` is a distinct request), but is registered under
    /// its eventual server-assigned id once creation completes.
    pub fn create_item(self: &Arc<Self>, partial: E) -> Arc<ItemQuery<E>> {
        let provisional_id = self.config.id_getter.get(&partial);
        let sink = self.sink_for(Some(provisional_id), None);
        ItemQuery::creating(self.config.clone(), partial, Some(sink))
    }

    fn fingerprint(filter: Option<&SimplifiedFilter>, order: &[SimplifiedOrderBy]) -> String {
        let order_json = serde_json::to_string(order).unwrap_or_default();
        let filter_json = filter.map(|f| serde_json::to_string(f).unwrap_or_default()).unwrap_or_else(|| "null".into());
        format!("ORDER<{order_json}>:FILTER<{filter_json}>")
    }

    /// Returns the cached collection query for this request's filter/order if
    /// present; otherwise seeds from the first ready collection whose filter
    /// is a syntactic superset, or falls back to a fresh fetch.
    pub fn get_collection(self: &Arc<Self>, request: CollectionRequest<E>) -> Result<Arc<CollectionQuery<E>>> {
        let simplified_filter = request.filter.as_ref().map(simplify);
        let simplified_order = simplify_order_by(&request.order);
        let key = Self::fingerprint(simplified_filter.as_ref(), &simplified_order);

        if let Some(existing) = self.collections.get(&key) {
            return Ok(existing);
        }

        let parent = self.live_collections().into_iter().find_map(|(_, cq)| {
            if cq.ready() && is_filter_subset(simplified_filter.as_ref(), cq.filter.as_ref(), &default_operator_key) {
                Some(cq)
            } else {
                None
            }
        });

        let sink = self.sink_for(None, Some(key.clone()));
        let query = CollectionQuery::open(
            self.config.clone(),
            &self.operators,
            self.primitive,
            request.filter,
            request.order,
            request.meta,
            parent,
            Some(sink),
        )?;
        self.collections.set(key, &query);
        Ok(query)
    }

    /// External push (from the root store): skips no originator.
    pub fn update_one(&self, item: E) { self.fan_out_upsert(item, None, None); }

    /// External push: skips no originator.
    pub fn delete_one(&self, id: EntityId) { self.fan_out_delete(id, None, None); }

    pub fn update_many(&self, items: Vec<E>) {
        for item in items {
            self.fan_out_upsert(item, None, None);
        }
    }

    pub fn delete_many(&self, ids: Vec<EntityId>) {
        for id in ids {
            self.fan_out_delete(id, None, None);
        }
    }

    pub fn update_mixed(&self, add: Vec<E>, del: Vec<EntityId>) {
        for id in del {
            self.fan_out_delete(id, None, None);
        }
        for item in add {
            self.fan_out_upsert(item, None, None);
        }
    }
}
