//! A map from `K` to `V` that only ever holds a weak reference to `V`.
//!
//! Used to deduplicate item and collection queries: the entity store hands
//! one out per distinct key, but does not keep it alive - once every caller
//! drops their handle, the entry is reclaimed and the next lookup for that
//! key builds a fresh one. Reclaimed entries are detected lazily, on the
//! next access that touches them, rather than through a finalizer callback
//! (Rust has none); [`WeakIndex::cleanup`] sweeps proactively for callers
//! that want bounded memory without waiting on next access.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, RwLock, Weak};

use crate::bus::{Bus, Owner};

#[derive(Clone, Debug)]
pub enum WeakIndexEvent<K> {
    Set { key: K },
    Delete { key: K },
    /// A value for `key` was found to have been reclaimed by the runtime.
    Finalize { key: K },
    Clear,
}

pub struct WeakIndex<K, V> {
    map: RwLock<HashMap<K, Weak<V>>>,
    bus: Bus<WeakIndexEvent<K>>,
    owner: Owner<WeakIndexEvent<K>>,
}

impl<K, V> WeakIndex<K, V>
where K: Eq + Hash + Clone + Send + Sync + 'static
{
    pub fn new() -> Self {
        let (bus, owner) = Bus::new();
        Self { map: RwLock::new(HashMap::new()), bus, owner }
    }

    pub fn events(&self) -> Bus<WeakIndexEvent<K>> { self.bus.clone() }

    /// Store a weak reference to `value` under `key`, replacing any prior entry.
    pub fn set(&self, key: K, value: &Arc<V>) {
        self.map.write().unwrap().insert(key.clone(), Arc::downgrade(value));
        let _ = self.bus.emit(&self.owner, WeakIndexEvent::Set { key });
    }

    /// Returns the live value for `key`, or `None` if absent or reclaimed.
    /// A reclaimed entry is removed and a `Finalize` event is emitted.
    pub fn get(&self, key: &K) -> Option<Arc<V>> { self.upgrade_or_finalize(key) }

    pub fn has(&self, key: &K) -> bool { self.get(key).is_some() }

    /// Remove `key` unconditionally (whether or not the value is still alive).
    pub fn delete(&self, key: &K) -> bool {
        let removed = self.map.write().unwrap().remove(key).is_some();
        if removed {
            let _ = self.bus.emit(&self.owner, WeakIndexEvent::Delete { key: key.clone() });
        }
        removed
    }

    /// Number of entries whose value is still live. Stale entries encountered
    /// along the way are finalized as a side effect, matching `get`/`has`.
    pub fn len(&self) -> usize { self.keys().len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Keys whose values are still live.
    pub fn keys(&self) -> Vec<K> {
        let candidates: Vec<K> = self.map.read().unwrap().keys().cloned().collect();
        candidates.into_iter().filter(|k| self.get(k).is_some()).collect()
    }

    /// Live values, dropping (and finalizing) any reclaimed entries found along the way.
    pub fn values(&self) -> Vec<Arc<V>> {
        let candidates: Vec<K> = self.map.read().unwrap().keys().cloned().collect();
        candidates.into_iter().filter_map(|k| self.get(&k)).collect()
    }

    /// Sweep every entry and drop the ones whose value has been reclaimed,
    /// emitting `Finalize` for each. Safe to call at any time; this is also
    /// done lazily by `get`/`has`/iteration, so explicit `cleanup` is only
    /// needed to bound memory ahead of the next access.
    pub fn cleanup(&self) {
        let candidates: Vec<K> = self.map.read().unwrap().keys().cloned().collect();
        for key in candidates {
            self.upgrade_or_finalize(&key);
        }
    }

    /// Drop every entry and emit a single `Clear` event (no per-key `Finalize`/`Delete`).
    pub fn clear(&self) {
        self.map.write().unwrap().clear();
        let _ = self.bus.emit(&self.owner, WeakIndexEvent::Clear);
    }

    fn upgrade_or_finalize(&self, key: &K) -> Option<Arc<V>> {
        let weak = self.map.read().unwrap().get(key).cloned();
        match weak {
            None => None,
            Some(weak) => match weak.upgrade() {
                Some(value) => Some(value),
                None => {
                    self.map.write().unwrap().remove(key);
                    let _ = self.bus.emit(&self.owner, WeakIndexEvent::Finalize { key: key.clone() });
                    None
                }
            },
        }
    }
}

impl<K, V> Default for WeakIndex<K, V>
where K: Eq + Hash + Clone + Send + Sync + 'static
{
    fn default() -> Self { Self::new() }
}
