//! Holds one [`EntityStore`] per declared entity name.
//!
//! Each entity type is a distinct Rust type, so unlike a dynamically-typed
//! registry this can't hold `Arc<EntityStore<E>>` values directly without
//! erasing `E`; `from` downcasts back to the caller's concrete type via
//! [`std::any::Any`], the idiomatic substitute for a name-keyed heterogeneous
//! map. A lookup under the wrong `E` simply returns `None`, the same as a
//! missing name.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::config::{DebugConfig, EntityConfig, StoreDefaults};
use crate::id::EntityId;
use serde::Serialize;

pub struct RootStore {
    debug: DebugConfig,
    defaults: StoreDefaults,
    stores: RwLock<HashMap<String, Arc<dyn Any + Send + Sync>>>,
}

impl RootStore {
    pub fn new(debug: DebugConfig, defaults: StoreDefaults) -> Self {
        Self { debug, defaults, stores: RwLock::new(HashMap::new()) }
    }

    pub fn debug(&self) -> &DebugConfig { &self.debug }

    pub fn defaults(&self) -> &StoreDefaults { &self.defaults }

    /// Resolve a per-entity config against this store's `defaults` section
    /// and then its `debug` section, in that order, the way §4.9 describes.
    pub fn resolve<E>(&self, config: EntityConfig<E>) -> Arc<EntityConfig<E>> {
        Arc::new(config.with_defaults(&self.defaults).with_debug(&self.debug))
    }

    /// Register an entity store under its own name. Replaces any previous
    /// registration for that name, including one of a different `E`.
    pub fn register<E>(&self, store: Arc<crate::entity_store::EntityStore<E>>)
    where E: Send + Sync + 'static {
        self.stores.write().unwrap().insert(store.name().to_string(), store as Arc<dyn Any + Send + Sync>);
    }

    /// Look up a previously registered store by name, downcasting to `E`.
    /// Returns `None` for an unknown name or a type mismatch.
    pub fn from<E>(&self, name: &str) -> Option<Arc<crate::entity_store::EntityStore<E>>>
    where E: Send + Sync + 'static {
        self.stores.read().unwrap().get(name)?.clone().downcast::<crate::entity_store::EntityStore<E>>().ok()
    }

    pub fn names(&self) -> Vec<String> { self.stores.read().unwrap().keys().cloned().collect() }

    /// Route an external push (from the out-of-scope event stream) to the
    /// named entity's store. A name unregistered for `E`, or not registered
    /// at all, is silently a no-op - there is nothing live to fan out to.
    pub fn update_one<E>(&self, name: &str, item: E)
    where E: Clone + Serialize + Send + Sync + 'static {
        if let Some(store) = self.from::<E>(name) {
            store.update_one(item);
        }
    }

    pub fn update_many<E>(&self, name: &str, items: Vec<E>)
    where E: Clone + Serialize + Send + Sync + 'static {
        if let Some(store) = self.from::<E>(name) {
            store.update_many(items);
        }
    }

    pub fn delete_one<E>(&self, name: &str, id: EntityId)
    where E: Clone + Serialize + Send + Sync + 'static {
        if let Some(store) = self.from::<E>(name) {
            store.delete_one(id);
        }
    }

    pub fn delete_many<E>(&self, name: &str, ids: Vec<EntityId>)
    where E: Clone + Serialize + Send + Sync + 'static {
        if let Some(store) = self.from::<E>(name) {
            store.delete_many(ids);
        }
    }

    pub fn update_mixed<E>(&self, name: &str, add: Vec<E>, del: Vec<EntityId>)
    where E: Clone + Serialize + Send + Sync + 'static {
        if let Some(store) = self.from::<E>(name) {
            store.update_mixed(add, del);
        }
    }
}

impl Default for RootStore {
    fn default() -> Self { Self::new(DebugConfig::default(), StoreDefaults::default()) }
}
