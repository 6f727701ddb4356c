//! Event payloads emitted by item queries, collection queries, and entity stores.

use std::sync::Arc;

use crate::id::EntityId;

#[derive(Clone)]
pub enum ItemQueryEvent<E> {
    Initialized,
    Created { id: EntityId },
    Ready { item: E },
    Updated { item: E },
    SelfUpdated { item: E },
    Deleted,
    SelfDeleted,
    Error { message: String },
}

#[derive(Clone)]
pub enum CollectionQueryEvent<E> {
    Ready,
    Updated,
    SelfUpdated,
    SelfItemCreated { item: E },
    ItemAdded { item: E },
    ItemUpdated { item: E },
    SelfItemUpdated { item: E },
    ItemDeleted { id: EntityId },
    SelfItemDeleted { id: EntityId },
    Error { message: String },
}

#[derive(Clone)]
pub enum EntityStoreEvent<E> {
    Initialized,
    ItemAdded { item: E },
    ItemUpdated { item: E },
    Updated,
    ItemDeleted { id: EntityId },
    Deleted,
}

/// What a self-initiated mutation on an item or collection query did, passed
/// to the entity store so it can fan the change out to sibling queries
/// without the query needing to know the store exists.
#[derive(Clone)]
pub enum SelfChange<E> {
    Upsert(E),
    Delete(EntityId),
}

/// Invoked by a query immediately after it emits a `self*` event. The
/// closure is supplied by the entity store at construction time; a query
/// with no sink (e.g. one built directly in a test) simply has nobody to tell.
pub type ChangeSink<E> = Arc<dyn Fn(SelfChange<E>) + Send + Sync>;
