//! Filtered, ordered live list over one entity type: initial population (own
//! fetch or seeded from a ready parent), incremental application pushed by
//! the entity store, and self-initiated create/update/delete.

use std::cmp::Ordering as CmpOrdering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::EntityConfig;
use crate::contracts::{CollectionParams, RequestParams};
use crate::error::{CoreError, Result};
use crate::events::{ChangeSink, CollectionQueryEvent, SelfChange};
use crate::id::EntityId;
use ripple_query::{
    build_comparator, compile, simplify, simplify_order_by, Comparator, FilterNode, OperatorMap, OrderBy,
    Predicate, PrimitiveComparator, SimplifiedFilter, SimplifiedOrderBy,
};
use ripple_signals::{Bus, Owner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CollectionState {
    Prefetched,
    Fetching,
    Refetching,
    Fetched,
    Errored,
    ReErrored,
}

impl CollectionState {
    pub fn in_progress(self) -> bool { matches!(self, CollectionState::Fetching | CollectionState::Refetching) }
}

struct Inflight {
    cancel: CancellationToken,
    generation: u64,
}

pub struct CollectionQuery<E> {
    config: Arc<EntityConfig<E>>,
    pub filter: Option<SimplifiedFilter>,
    pub order: Vec<SimplifiedOrderBy>,
    meta: Option<Value>,
    predicate: Predicate<E>,
    comparator: Comparator<E>,
    items: RwLock<Vec<E>>,
    state: RwLock<CollectionState>,
    last_error: RwLock<Option<Arc<str>>>,
    generation: AtomicU64,
    inflight: RwLock<Option<Inflight>>,
    progress_notify: Arc<Notify>,
    ready_emitted: RwLock<bool>,
    /// See [`Self::debounce_wait`] - same drop-latest policy as `ItemQuery`.
    last_mutation_at: RwLock<Option<Instant>>,
    sink: Option<ChangeSink<E>>,
    bus: Bus<CollectionQueryEvent<E>>,
    owner: Owner<CollectionQueryEvent<E>>,
}

impl<E> CollectionQuery<E>
where E: Clone + Serialize + Send + Sync + 'static
{
    /// Compiles `filter`/`order` against `operators`/`primitive`, then either
    /// seeds from `parent` (if it's ready and a syntactic superset) or kicks
    /// off `collectionFetcher`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        config: Arc<EntityConfig<E>>,
        operators: &OperatorMap,
        primitive: PrimitiveComparator,
        filter: Option<FilterNode<E>>,
        order: Vec<OrderBy<E>>,
        meta: Option<Value>,
        parent: Option<Arc<CollectionQuery<E>>>,
        sink: Option<ChangeSink<E>>,
    ) -> Result<Arc<Self>> {
        let predicate: Predicate<E> = match &filter {
            Some(node) => compile(operators, node)?,
            None => Box::new(|_: &E| true),
        };
        let simplified_filter = filter.as_ref().map(simplify);
        let simplified_order = simplify_order_by(&order);
        let base_comparator = build_comparator(primitive, order);
        let id_getter = config.id_getter.clone();
        let comparator: Comparator<E> = Arc::new(move |a: &E, b: &E| {
            let ord = base_comparator(a, b)?;
            if ord != CmpOrdering::Equal {
                return Ok(ord);
            }
            Ok(id_getter.get(a).cmp(&id_getter.get(b)))
        });

        let (bus, owner) = Bus::new();
        let seeded = match &parent {
            Some(p) if p.ready() => {
                let candidates = p.items.read().unwrap().clone();
                Some(candidates.into_iter().filter(|i| predicate(i)).collect::<Vec<_>>())
            }
            _ => None,
        };

        let initial_state = if seeded.is_some() { CollectionState::Prefetched } else { CollectionState::Fetching };

        let query = Arc::new(Self {
            config,
            filter: simplified_filter,
            order: simplified_order,
            meta,
            predicate,
            comparator,
            items: RwLock::new(Vec::new()),
            state: RwLock::new(initial_state),
            last_error: RwLock::new(None),
            generation: AtomicU64::new(0),
            inflight: RwLock::new(None),
            progress_notify: Arc::new(Notify::new()),
            ready_emitted: RwLock::new(false),
            last_mutation_at: RwLock::new(None),
            sink,
            bus,
            owner,
        });

        match seeded {
            Some(raw) => {
                let sorted = query.dedup_sort(raw)?;
                *query.items.write().unwrap() = sorted;
                query.mark_ready();
            }
            None => {
                let generation = query.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
                let cancel = CancellationToken::new();
                *query.inflight.write().unwrap() = Some(Inflight { cancel: cancel.clone(), generation });
                let qc = query.clone();
                crate::task::spawn(async move {
                    let req = RequestParams { signal: cancel };
                    let params = CollectionParams { filter: qc.filter.clone(), order: qc.order.clone(), meta: qc.meta.clone() };
                    let result = qc.config.fetchers.fetch_collection(&params, &req).await;
                    qc.finish_fetch(generation, result);
                });
            }
        }

        Ok(query)
    }

    /// At most one outstanding network operation per collection query,
    /// mirroring `ItemQuery::begin_op` - shared by `refetch` and by the
    /// self-initiated `create`/`update`/`delete` below, since §4.7 extends
    /// §4.6's concurrency rules to collection self-mutations even though
    /// `CollectionState` itself has no `Creating`/`Updating`/`Deleting`
    /// variants to drive.
    fn begin_op(&self, force: bool) -> Result<(CancellationToken, u64)> {
        let mut inflight = self.inflight.write().unwrap();
        if inflight.is_some() && !force {
            return Err(CoreError::AlreadyRunning);
        }
        if let Some(old) = inflight.take() {
            old.cancel.cancel();
        }
        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *inflight = Some(Inflight { cancel: cancel.clone(), generation });
        Ok((cancel, generation))
    }

    fn end_op(&self, generation: u64) -> bool {
        let mut inflight = self.inflight.write().unwrap();
        let is_current = matches!(&*inflight, Some(inf) if inf.generation == generation);
        if is_current {
            *inflight = None;
        }
        drop(inflight);
        self.progress_notify.notify_waiters();
        is_current
    }

    fn finish_fetch(&self, generation: u64, result: std::result::Result<Vec<E>, crate::error::FetchError>) {
        if !self.end_op(generation) {
            return;
        }
        match result {
            Ok(data) => {
                let _ = self.apply_fetch_response(data);
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    fn apply_fetch_response(&self, data: Vec<E>) -> Result<()> {
        let installed = if self.config.trust_query {
            if self.config.dev_mode {
                if let Ok(checked) = self.dedup_sort(data.clone().into_iter().filter(|i| (self.predicate)(i)).collect()) {
                    if checked.len() != data.len() {
                        tracing::warn!(entity = %self.config.name, "collectionFetcher returned items outside the requested filter (dev mode, accepted verbatim)");
                    }
                }
            }
            data
        } else {
            self.dedup_sort(data.into_iter().filter(|i| (self.predicate)(i)).collect())?
        };

        *self.items.write().unwrap() = installed;
        *self.last_error.write().unwrap() = None;
        *self.state.write().unwrap() = CollectionState::Fetched;
        self.mark_ready();
        Ok(())
    }

    fn mark_ready(&self) {
        let first = {
            let mut flag = self.ready_emitted.write().unwrap();
            let first = !*flag;
            *flag = true;
            first
        };
        if first {
            self.emit(CollectionQueryEvent::Ready);
        }
        self.emit(CollectionQueryEvent::Updated);
        self.emit(CollectionQueryEvent::SelfUpdated);
    }

    fn fail(&self, message: &str) {
        let had_items = !self.items.read().unwrap().is_empty();
        *self.state.write().unwrap() = if had_items { CollectionState::ReErrored } else { CollectionState::Errored };
        *self.last_error.write().unwrap() = Some(Arc::from(message));
        self.emit(CollectionQueryEvent::Error { message: message.to_string() });
    }

    fn emit(&self, event: CollectionQueryEvent<E>) { let _ = self.bus.emit(&self.owner, event); }

    fn insertion_index(&self, items: &[E], item: &E) -> Result<usize> {
        for (i, existing) in items.iter().enumerate() {
            if (self.comparator)(item, existing)? == CmpOrdering::Less {
                return Ok(i);
            }
        }
        Ok(items.len())
    }

    /// Builds a sorted, id-deduplicated vector from raw input, last write wins.
    fn dedup_sort(&self, raw: Vec<E>) -> Result<Vec<E>> {
        let mut out: Vec<E> = Vec::with_capacity(raw.len());
        for item in raw {
            let id = self.config.id_getter.get(&item);
            if let Some(pos) = out.iter().position(|e| self.config.id_getter.get(e) == id) {
                out.remove(pos);
            }
            let idx = self.insertion_index(&out, &item)?;
            out.insert(idx, item);
        }
        Ok(out)
    }

    pub fn events(&self) -> Bus<CollectionQueryEvent<E>> { self.bus.clone() }
    pub fn state(&self) -> CollectionState { *self.state.read().unwrap() }
    pub fn in_progress(&self) -> bool { self.state().in_progress() }
    pub fn ready(&self) -> bool { matches!(self.state(), CollectionState::Prefetched | CollectionState::Fetched) }
    pub fn last_error(&self) -> Option<Arc<str>> { self.last_error.read().unwrap().clone() }
    pub fn len(&self) -> usize { self.items.read().unwrap().len() }
    pub fn is_empty(&self) -> bool { self.len() == 0 }
    pub fn at(&self, i: usize) -> Option<E> { self.items.read().unwrap().get(i).cloned() }
    pub fn items_snapshot(&self) -> Vec<E> { self.items.read().unwrap().clone() }

    pub fn get_by_id(&self, id: &EntityId) -> Option<E> {
        self.items.read().unwrap().iter().find(|e| self.config.id_getter.get(e) == *id).cloned()
    }

    pub async fn progress(&self) {
        let notified = self.progress_notify.notified();
        if !self.in_progress() {
            return;
        }
        notified.await;
    }

    pub async fn refetch(&self, force: bool) -> Result<()> {
        // A fetch/refetch already running rejoins rather than erroring -
        // the one carve-out to the generic already-running rule below, for
        // a conflict of the same kind as this call.
        if self.in_progress() && !force {
            self.progress().await;
            return Ok(());
        }
        let (cancel, generation) = self.begin_op(force)?;
        let target = if self.items.read().unwrap().is_empty() { CollectionState::Fetching } else { CollectionState::Refetching };
        *self.state.write().unwrap() = target;

        let req = RequestParams { signal: cancel };
        let params = CollectionParams { filter: self.filter.clone(), order: self.order.clone(), meta: self.meta.clone() };
        let result = self.config.fetchers.fetch_collection(&params, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        match result {
            Ok(data) => self.apply_fetch_response(data),
            Err(e) => {
                self.fail(&e.to_string());
                Err(CoreError::Fetching(e))
            }
        }
    }

    /// Incremental push: insert, reposition, or remove a single item per the
    /// compiled predicate. Emits `itemAdded`/`itemUpdated`/`itemDeleted`.
    pub fn set_one(&self, item: E) -> Result<()> {
        let id = self.config.id_getter.get(&item);
        let matches = (self.predicate)(&item);
        let mut items = self.items.write().unwrap();
        let existing_idx = items.iter().position(|e| self.config.id_getter.get(e) == id);

        if !matches {
            if let Some(idx) = existing_idx {
                items.remove(idx);
                drop(items);
                self.emit(CollectionQueryEvent::ItemDeleted { id });
            }
            return Ok(());
        }

        if let Some(idx) = existing_idx {
            items.remove(idx);
        }
        let idx = self.insertion_index(&items, &item)?;
        items.insert(idx, item.clone());
        drop(items);
        if existing_idx.is_some() {
            self.emit(CollectionQueryEvent::ItemUpdated { item });
        } else {
            self.emit(CollectionQueryEvent::ItemAdded { item });
        }
        Ok(())
    }

    /// Incremental push: remove a single item by id if present.
    pub fn delete_one(&self, id: &EntityId) -> Result<()> {
        let mut items = self.items.write().unwrap();
        if let Some(idx) = items.iter().position(|e| self.config.id_getter.get(e) == *id) {
            items.remove(idx);
            drop(items);
            self.emit(CollectionQueryEvent::ItemDeleted { id: id.clone() });
        }
        Ok(())
    }

    /// Atomically apply an add/delete batch; a single `updated` event fires
    /// regardless of how many items changed.
    pub fn update_mixed(&self, add: Vec<E>, del: Vec<EntityId>) -> Result<()> {
        {
            let mut items = self.items.write().unwrap();
            for id in &del {
                if let Some(idx) = items.iter().position(|e| self.config.id_getter.get(e) == *id) {
                    items.remove(idx);
                }
            }
            for item in add {
                let id = self.config.id_getter.get(&item);
                if let Some(idx) = items.iter().position(|e| self.config.id_getter.get(e) == id) {
                    items.remove(idx);
                }
                if !(self.predicate)(&item) {
                    continue;
                }
                let idx = self.insertion_index(&items, &item)?;
                items.insert(idx, item);
            }
        }
        self.emit(CollectionQueryEvent::Updated);
        Ok(())
    }

    pub fn set_many(&self, items: Vec<E>) -> Result<()> { self.update_mixed(items, Vec::new()) }
    pub fn delete_many(&self, ids: Vec<EntityId>) -> Result<()> { self.update_mixed(Vec::new(), ids) }

    fn apply_self(&self, item: E) -> Result<bool> {
        let id = self.config.id_getter.get(&item);
        let matches = (self.predicate)(&item);
        let mut items = self.items.write().unwrap();
        let existing_idx = items.iter().position(|e| self.config.id_getter.get(e) == id);
        if !matches {
            if let Some(idx) = existing_idx {
                items.remove(idx);
            }
            return Ok(existing_idx.is_some());
        }
        if let Some(idx) = existing_idx {
            items.remove(idx);
        }
        let idx = self.insertion_index(&items, &item)?;
        items.insert(idx, item);
        Ok(true)
    }

    /// Same drop-latest `update_debounce` coalescing as `ItemQuery::debounce_wait`:
    /// a self-initiated mutation requested less than `update_debounce` after
    /// the previous one reached the network waits out the remainder first.
    fn debounce_wait(&self) -> Option<Duration> {
        let debounce = self.config.update_debounce;
        if debounce.is_zero() {
            return None;
        }
        let last = *self.last_mutation_at.read().unwrap();
        last.and_then(|t| {
            let elapsed = t.elapsed();
            if elapsed < debounce { Some(debounce - elapsed) } else { None }
        })
    }

    fn mark_mutation_sent(&self) { *self.last_mutation_at.write().unwrap() = Some(Instant::now()); }

    pub async fn create(&self, partial: E) -> Result<()> {
        if let Some(wait) = self.debounce_wait() {
            tokio::time::sleep(wait).await;
        }
        let (cancel, generation) = self.begin_op(false)?;
        self.mark_mutation_sent();
        let req = RequestParams { signal: cancel };
        let result = self.config.fetchers.create_item(partial, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        let created = result.map_err(CoreError::Fetching)?;
        self.apply_self(created.clone())?;
        self.emit(CollectionQueryEvent::SelfItemCreated { item: created.clone() });
        if let Some(sink) = &self.sink {
            sink(SelfChange::Upsert(created));
        }
        Ok(())
    }

    pub async fn update(&self, item: E) -> Result<()> {
        if let Some(wait) = self.debounce_wait() {
            tokio::time::sleep(wait).await;
        }
        let (cancel, generation) = self.begin_op(false)?;
        self.mark_mutation_sent();
        let req = RequestParams { signal: cancel };
        let result = self.config.fetchers.update_item(item, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        let updated = result.map_err(CoreError::Updating)?;
        self.apply_self(updated.clone())?;
        self.emit(CollectionQueryEvent::SelfItemUpdated { item: updated.clone() });
        if let Some(sink) = &self.sink {
            sink(SelfChange::Upsert(updated));
        }
        Ok(())
    }

    pub async fn delete(&self, id: EntityId) -> Result<()> {
        if let Some(wait) = self.debounce_wait() {
            tokio::time::sleep(wait).await;
        }
        let (cancel, generation) = self.begin_op(false)?;
        self.mark_mutation_sent();
        let req = RequestParams { signal: cancel };
        let result = self.config.fetchers.delete_item(&id, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        let outcome = result.map_err(CoreError::Deleting)?;
        if !outcome.success {
            return Err(CoreError::UnsuccessfulDeletion);
        }
        self.delete_one(&id)?;
        self.emit(CollectionQueryEvent::SelfItemDeleted { id: id.clone() });
        if let Some(sink) = &self.sink {
            sink(SelfChange::Delete(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EntityConfig;
    use crate::contracts::{DeleteOutcome, Fetchers};
    use crate::id::IdGetter;
    use async_trait::async_trait;
    use ripple_query::{default_operators, default_primitive_comparator, PropertyGetter};
    use serde::Deserialize;
    use std::sync::Mutex;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
    struct Row {
        id: String,
        a: i64,
        name: String,
    }

    struct FakeFetchers {
        rows: Mutex<Vec<Row>>,
    }

    #[async_trait]
    impl Fetchers<Row> for FakeFetchers {
        async fn fetch_collection(&self, _: &CollectionParams, _: &RequestParams) -> std::result::Result<Vec<Row>, crate::error::FetchError> {
            Ok(self.rows.lock().unwrap().clone())
        }
        async fn fetch_item(&self, id: &EntityId, _: Option<&Value>, _: &RequestParams) -> std::result::Result<Row, crate::error::FetchError> {
            Ok(Row { id: id.to_string(), a: 0, name: String::new() })
        }
        async fn create_item(&self, partial: Row, _: &RequestParams) -> std::result::Result<Row, crate::error::FetchError> {
            tokio::task::yield_now().await;
            Ok(partial)
        }
        async fn update_item(&self, item: Row, _: &RequestParams) -> std::result::Result<Row, crate::error::FetchError> {
            tokio::task::yield_now().await;
            Ok(item)
        }
        async fn delete_item(&self, id: &EntityId, _: &RequestParams) -> std::result::Result<DeleteOutcome, crate::error::FetchError> {
            tokio::task::yield_now().await;
            Ok(DeleteOutcome { id: id.clone(), success: true })
        }
    }

    fn config(rows: Vec<Row>) -> Arc<EntityConfig<Row>> {
        Arc::new(EntityConfig::new("row", IdGetter::field("id"), Arc::new(FakeFetchers { rows: Mutex::new(rows) })))
    }

    #[tokio::test]
    async fn fetches_filters_and_sorts_on_open() {
        let rows = vec![
            Row { id: "2".into(), a: 1, name: "B".into() },
            Row { id: "1".into(), a: 1, name: "A".into() },
            Row { id: "3".into(), a: 2, name: "C".into() },
        ];
        let ops = default_operators();
        let filter = FilterNode::operator("eq", PropertyGetter::field("a"), Value::from(1));
        let order = vec![OrderBy::new(PropertyGetter::field("name"))];
        let q = CollectionQuery::open(config(rows), &ops, default_primitive_comparator, Some(filter), order, None, None, None).unwrap();
        q.progress().await;
        assert_eq!(q.items_snapshot().iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn seeds_from_ready_parent_without_fetching() {
        let parent_rows = vec![
            Row { id: "1".into(), a: 1, name: "A".into() },
            Row { id: "2".into(), a: 1, name: "B".into() },
            Row { id: "3".into(), a: 2, name: "C".into() },
        ];
        let ops = default_operators();
        let parent_filter = FilterNode::operator("eq", PropertyGetter::field("a"), Value::from(1));
        let parent = CollectionQuery::open(config(parent_rows), &ops, default_primitive_comparator, Some(parent_filter), vec![], None, None, None).unwrap();
        parent.progress().await;
        assert!(parent.ready());

        let child_filter = FilterNode::and(vec![
            FilterNode::operator("eq", PropertyGetter::field("a"), Value::from(1)),
            FilterNode::operator("eq", PropertyGetter::field("name"), Value::from("B")),
        ]);
        let child = CollectionQuery::open(config(vec![]), &ops, default_primitive_comparator, Some(child_filter), vec![], None, Some(parent), None).unwrap();
        assert_eq!(child.state(), CollectionState::Prefetched);
        assert_eq!(child.items_snapshot().iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["2"]);
    }

    #[tokio::test]
    async fn set_one_inserts_updates_and_removes_by_predicate() {
        let ops = default_operators();
        let filter = FilterNode::operator("eq", PropertyGetter::field("a"), Value::from(1));
        let q = CollectionQuery::open(config(vec![]), &ops, default_primitive_comparator, Some(filter), vec![], None, None, None).unwrap();
        q.progress().await;

        q.set_one(Row { id: "1".into(), a: 1, name: "A".into() }).unwrap();
        assert_eq!(q.len(), 1);

        q.set_one(Row { id: "1".into(), a: 2, name: "A*".into() }).unwrap();
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn update_mixed_applies_batch_with_single_event() {
        let ops = default_operators();
        let q = CollectionQuery::open(config(vec![]), &ops, default_primitive_comparator, None, vec![], None, None, None).unwrap();
        q.progress().await;
        q.update_mixed(vec![Row { id: "3".into(), a: 1, name: "C".into() }], vec![EntityId::from("1")]).unwrap();
        assert_eq!(q.items_snapshot().iter().map(|r| r.id.clone()).collect::<Vec<_>>(), vec!["3"]);
    }

    #[tokio::test]
    async fn delete_propagates_to_own_items() {
        let rows = vec![Row { id: "1".into(), a: 1, name: "A".into() }];
        let ops = default_operators();
        let q = CollectionQuery::open(config(rows), &ops, default_primitive_comparator, None, vec![], None, None, None).unwrap();
        q.progress().await;
        assert_eq!(q.len(), 1);
        q.delete(EntityId::from("1")).await.unwrap();
        assert_eq!(q.len(), 0);
    }

    #[tokio::test]
    async fn concurrent_self_mutations_race_and_the_loser_sees_already_running() {
        let ops = default_operators();
        let q = CollectionQuery::open(config(vec![]), &ops, default_primitive_comparator, None, vec![], None, None, None).unwrap();
        q.progress().await;

        let a = q.create(Row { id: "1".into(), a: 1, name: "A".into() });
        let b = q.create(Row { id: "2".into(), a: 1, name: "B".into() });
        let (ra, rb) = tokio::join!(a, b);
        let results = [ra, rb];
        assert!(results.iter().any(|r| r.is_ok()));
        assert!(results.iter().any(|r| matches!(r, Err(CoreError::AlreadyRunning))));
    }

    #[tokio::test]
    async fn refetch_without_force_fails_already_running_against_an_in_flight_mutation() {
        let ops = default_operators();
        let q = CollectionQuery::open(config(vec![]), &ops, default_primitive_comparator, None, vec![], None, None, None).unwrap();
        q.progress().await;

        let create = q.create(Row { id: "1".into(), a: 1, name: "A".into() });
        let refetch = q.refetch(false);
        let (create_result, refetch_result) = tokio::join!(create, refetch);
        assert!(create_result.is_ok());
        assert!(matches!(refetch_result, Err(CoreError::AlreadyRunning)));
    }
}
