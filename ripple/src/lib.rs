/*!
# Ripple

A reactive, normalized entity cache that sits between an application and a
remote data source. For each entity type you declare, `ripple` serves two
kinds of live queries - a single-item query by identity, and a filtered,
ordered collection query - and keeps them coherent with one another as
mutations, server refreshes, and externally pushed events arrive.

```ignore
use std::sync::Arc;
use ripple::{EntityConfig, EntityStore, IdGetter, RootStore};

let root = RootStore::default();
let config = Arc::new(EntityConfig::new("widget", IdGetter::field("id"), fetchers));
let store = EntityStore::new(config, ripple::default_operators(), ripple::default_primitive_comparator);
root.register(store.clone());

let item = store.get_item("1".into());
item.progress().await;
println!("{:?}", item.data()?);
```

## Design philosophy

`ripple` does not talk to a network itself - five caller-supplied callbacks
(fetch collection, fetch item, create, update, delete) are the entire
transport boundary ([`Fetchers`]). Everything this crate owns is the
coherence engine that sits on top of them:

- the query lifecycle state machine, with cancellation and at-most-one-
  in-flight-per-query semantics ([`ItemQuery`], [`CollectionQuery`]),
- the fan-out that keeps item queries, collection queries, and the entity
  index mutually consistent while suppressing echoes back to whichever
  query originated a change ([`EntityStore`]),
- the filter and order algebra used to evaluate predicates, seed new
  collection queries from existing ones, and define item order
  ([`ripple_query`]),
- a deferred-dispatch event bus and a weak-value index that deduplicates
  queries without pinning them in memory forever ([`ripple_signals`]).

A query-builder DSL that produces [`FilterNode`]/[`OrderBy`] descriptors,
framework-specific view adapters, and the transport itself are all
deliberately left to the application; this crate only defines the shapes
they need to agree on.
*/

pub use ripple_core as core;
pub use ripple_query as query;
pub use ripple_signals as signals;

pub use ripple_core::{
    ChangeSink, CollectionParams, CollectionQuery, CollectionQueryEvent, CollectionRequest, CollectionState, CoreError,
    DebugConfig, DeleteOutcome, EntityConfig, EntityId, EntityStore, EntityStoreEvent, FetchError, Fetchers, IdGetter,
    ItemQuery, ItemQueryEvent, ItemState, LogLevel, Reported, RequestParams, Result, RootStore, SelfChange, StoreDefaults,
};
pub use ripple_query::{
    build_comparator, canonicalize, compare_simplified, compile, default_operator_key, default_operators,
    default_primitive_comparator, is_filter_subset, simplify, simplify_order_by, Comparator, ConjKind, FilterNode, Nulls,
    OperatorFn, OperatorMap, OrderBy, Predicate, PrimitiveComparator, PropertyGetter, QueryError, SimplifiedFilter,
    SimplifiedOrderBy,
};
pub use ripple_signals::{Bus, BusError, Owner, Subscription, WeakIndex, WeakIndexEvent};
