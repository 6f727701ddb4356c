//! Single-entity live handle: state machine, mutable draft, and the
//! commit/update/mutate/delete/refetch operations, each serialized behind
//! "at most one outstanding network operation per query".

use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::config::EntityConfig;
use crate::contracts::RequestParams;
use crate::error::{CoreError, FetchError, Reported, Result};
use crate::events::{ChangeSink, ItemQueryEvent, SelfChange};
use crate::id::EntityId;
use ripple_signals::{Bus, Owner};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemState {
    Initialized,
    Prefetched,
    Creating,
    Fetching,
    Refetching,
    Updating,
    Deleting,
    Fetched,
    Actualized,
    Errored,
    ReErrored,
    Deleted,
}

impl ItemState {
    pub fn in_progress(self) -> bool {
        matches!(
            self,
            ItemState::Creating | ItemState::Fetching | ItemState::Refetching | ItemState::Updating | ItemState::Deleting
        )
    }
}

struct Inflight {
    cancel: CancellationToken,
    generation: u64,
}

pub struct ItemQuery<E> {
    config: Arc<EntityConfig<E>>,
    id: RwLock<EntityId>,
    state: RwLock<ItemState>,
    item: RwLock<Option<Arc<E>>>,
    mutable: RwLock<Option<E>>,
    last_error: RwLock<Option<Arc<str>>>,
    generation: AtomicU64,
    inflight: RwLock<Option<Inflight>>,
    progress_notify: Arc<Notify>,
    /// When the last self-initiated mutation reached the network, for
    /// `update_debounce` coalescing (see [`Self::debounce_wait`]).
    last_mutation_at: RwLock<Option<Instant>>,
    sink: Option<ChangeSink<E>>,
    bus: Bus<ItemQueryEvent<E>>,
    owner: Owner<ItemQueryEvent<E>>,
}

impl<E> ItemQuery<E>
where E: Clone + Serialize + Send + Sync + 'static
{
    fn new_raw(
        config: Arc<EntityConfig<E>>,
        id: EntityId,
        state: ItemState,
        item: Option<E>,
        sink: Option<ChangeSink<E>>,
    ) -> Arc<Self> {
        let (bus, owner) = Bus::new();
        let mutable = item.clone();
        let query = Arc::new(Self {
            config,
            id: RwLock::new(id),
            state: RwLock::new(state),
            item: RwLock::new(item.map(Arc::new)),
            mutable: RwLock::new(mutable),
            last_error: RwLock::new(None),
            generation: AtomicU64::new(0),
            inflight: RwLock::new(None),
            progress_notify: Arc::new(Notify::new()),
            last_mutation_at: RwLock::new(None),
            sink,
            bus,
            owner,
        });
        query.emit(ItemQueryEvent::Initialized);
        query
    }

    /// Built from an item the caller already has in hand (e.g. seeded from
    /// the entity index). Starts in `Prefetched`, no fetcher call.
    pub fn from_prefetched(config: Arc<EntityConfig<E>>, item: E, sink: Option<ChangeSink<E>>) -> Arc<Self> {
        let id = config.id_getter.get(&item);
        Self::new_raw(config, id, ItemState::Prefetched, Some(item), sink)
    }

    /// Built for an id not yet known locally; immediately invokes `itemFetcher`.
    pub fn fetching(config: Arc<EntityConfig<E>>, id: EntityId, sink: Option<ChangeSink<E>>) -> Arc<Self> {
        let q = Self::new_raw(config, id.clone(), ItemState::Fetching, None, sink);
        let (cancel, generation) = q.arm_inflight();
        let qc = q.clone();
        crate::task::spawn(async move {
            let req = RequestParams { signal: cancel };
            let result = qc.config.fetchers.fetch_item(&id, None, &req).await;
            qc.finish(generation, result, false);
        });
        q
    }

    /// Built from a partial to create; immediately invokes `itemCreator`.
    pub fn creating(config: Arc<EntityConfig<E>>, partial: E, sink: Option<ChangeSink<E>>) -> Arc<Self> {
        let id = config.id_getter.get(&partial);
        let q = Self::new_raw(config, id, ItemState::Creating, None, sink);
        let (cancel, generation) = q.arm_inflight();
        let qc = q.clone();
        crate::task::spawn(async move {
            let req = RequestParams { signal: cancel };
            let result = qc.config.fetchers.create_item(partial, &req).await;
            qc.finish(generation, result, true);
        });
        q
    }

    fn arm_inflight(&self) -> (CancellationToken, u64) {
        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.inflight.write().unwrap() = Some(Inflight { cancel: cancel.clone(), generation });
        (cancel, generation)
    }

    /// Returns `true` if `generation` is still the active operation (i.e.
    /// hasn't been superseded by a later `force` call), clearing it either way.
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

    fn finish(&self, generation: u64, result: std::result::Result<E, FetchError>, was_creating: bool) {
        if !self.end_op(generation) {
            return; // superseded: cancellation never surfaces as an error
        }
        match result {
            Ok(data) => {
                let _ = self.install_fetched(data, was_creating);
            }
            Err(e) => self.fail(&e.to_string()),
        }
    }

    fn install_fetched(&self, data: E, was_creating: bool) -> Result<()> {
        let server_id = self.config.id_getter.get(&data);
        let tracked_id = self.id();

        if was_creating {
            *self.id.write().unwrap() = server_id.clone();
            self.emit(ItemQueryEvent::Created { id: server_id });
        } else if self.config.trust_query {
            if self.config.dev_mode && server_id != tracked_id {
                tracing::warn!(tracked = %tracked_id, server = %server_id, "trustQuery id mismatch (dev mode, accepted)");
                *self.id.write().unwrap() = server_id;
            }
        } else if server_id != tracked_id {
            let err = CoreError::TrustIdMismatch { requested: tracked_id.to_string(), server: server_id.to_string() };
            self.fail(&err.to_string());
            return Err(err);
        }

        let first_arrival = self.item.read().unwrap().is_none();
        *self.item.write().unwrap() = Some(Arc::new(data.clone()));
        *self.mutable.write().unwrap() = Some(data.clone());
        *self.last_error.write().unwrap() = None;
        *self.state.write().unwrap() = ItemState::Fetched;

        if first_arrival {
            self.emit(ItemQueryEvent::Ready { item: data.clone() });
        }
        self.emit(ItemQueryEvent::Updated { item: data.clone() });
        self.emit(ItemQueryEvent::SelfUpdated { item: data.clone() });
        if let Some(sink) = &self.sink {
            sink(SelfChange::Upsert(data));
        }
        Ok(())
    }

    fn fail(&self, message: &str) {
        let had_item = self.item.read().unwrap().is_some();
        *self.state.write().unwrap() = if had_item { ItemState::ReErrored } else { ItemState::Errored };
        *self.last_error.write().unwrap() = Some(Arc::from(message));
        self.emit(ItemQueryEvent::Error { message: message.to_string() });
    }

    fn emit(&self, event: ItemQueryEvent<E>) { let _ = self.bus.emit(&self.owner, event); }

    fn begin_op(&self, new_state: ItemState, force: bool) -> Result<(CancellationToken, u64)> {
        let mut state_guard = self.state.write().unwrap();
        let current = *state_guard;
        if current == ItemState::Deleted {
            return Err(CoreError::Internal("operation attempted on a deleted query".into()));
        }
        if current == ItemState::Creating {
            return Err(CoreError::NotCreated);
        }
        if current.in_progress() && !force {
            return Err(CoreError::AlreadyRunning);
        }
        if let Some(old) = self.inflight.write().unwrap().take() {
            old.cancel.cancel();
        }
        let generation = self.generation.fetch_add(1, AtomicOrdering::SeqCst) + 1;
        let cancel = CancellationToken::new();
        *self.inflight.write().unwrap() = Some(Inflight { cancel: cancel.clone(), generation });
        *state_guard = new_state;
        Ok((cancel, generation))
    }

    /// `update_debounce` coalescing: if a self-initiated mutation reached
    /// the network less than `update_debounce` ago, the remaining wait
    /// before the next one may proceed. Policy is drop-latest - a burst of
    /// calls inside the window all wait out the same remaining interval and
    /// then race for `begin_op` under the ordinary (non-debounce)
    /// concurrency rules, so only one actually reaches the network per
    /// window; the rest see `AlreadyRunning` unless they pass `force`.
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

    /// The in-flight operation's id-sensitive failure mode, reconstructed as
    /// a generic error when a caller rejoins someone else's already-running
    /// fetch/refetch rather than starting a new one.
    fn rejoined_outcome(&self) -> Result<()> {
        if matches!(self.state(), ItemState::Errored | ItemState::ReErrored) {
            if let Some(msg) = self.last_error() {
                return Err(CoreError::Fetching(Box::new(Reported(msg.to_string()))));
            }
        }
        Ok(())
    }

    pub fn events(&self) -> Bus<ItemQueryEvent<E>> { self.bus.clone() }
    pub fn id(&self) -> EntityId { self.id.read().unwrap().clone() }
    pub fn state(&self) -> ItemState { *self.state.read().unwrap() }
    pub fn in_progress(&self) -> bool { self.state().in_progress() }
    pub fn ready(&self) -> bool {
        matches!(self.state(), ItemState::Fetched | ItemState::Actualized | ItemState::Prefetched)
            && self.item.read().unwrap().is_some()
    }
    pub fn last_error(&self) -> Option<Arc<str>> { self.last_error.read().unwrap().clone() }

    pub fn data(&self) -> Result<Arc<E>> { self.item.read().unwrap().clone().ok_or(CoreError::NotReady) }

    pub fn mutable(&self) -> Result<E> {
        if self.state() == ItemState::Deleted {
            return Err(CoreError::DeletedItem);
        }
        self.mutable.read().unwrap().clone().ok_or(CoreError::NotReady)
    }

    /// Resolves once the current in-flight operation settles (success,
    /// failure, or cancellation). Resolves immediately if nothing is in flight.
    pub async fn progress(&self) {
        let notified = self.progress_notify.notified();
        if !self.in_progress() {
            return;
        }
        notified.await;
    }

    pub async fn refetch(&self, force: bool) -> Result<()> {
        if matches!(self.state(), ItemState::Fetching | ItemState::Refetching) && !force {
            self.progress().await;
            return self.rejoined_outcome();
        }
        let target = if self.item.read().unwrap().is_some() { ItemState::Refetching } else { ItemState::Fetching };
        let (cancel, generation) = self.begin_op(target, force)?;
        let req = RequestParams { signal: cancel };
        let id = self.id();
        let result = self.config.fetchers.fetch_item(&id, None, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        match result {
            Ok(data) => self.install_fetched(data, false),
            Err(e) => {
                self.fail(&e.to_string());
                Err(CoreError::Fetching(e))
            }
        }
    }

    pub async fn commit(&self, force: bool) -> Result<()> {
        let mutable = self.mutable()?;
        self.send_update(mutable, force).await
    }

    pub async fn update(&self, new_item: E, force: bool) -> Result<()> { self.send_update(new_item, force).await }

    pub async fn mutate<F>(&self, f: F, force: bool) -> Result<()>
    where F: FnOnce(&mut E) {
        let mut draft = self.data()?.as_ref().clone();
        f(&mut draft);
        self.send_update(draft, force).await
    }

    async fn send_update(&self, new_item: E, force: bool) -> Result<()> {
        if !self.config.trust_query {
            let tracked = self.id();
            let given = self.config.id_getter.get(&new_item);
            if given != tracked {
                *self.mutable.write().unwrap() = self.item.read().unwrap().as_deref().cloned();
                return Err(CoreError::IdMismatch { tracked: tracked.to_string(), given: given.to_string() });
            }
        }
        if !force {
            if let Some(wait) = self.debounce_wait() {
                tokio::time::sleep(wait).await;
            }
        }
        let (cancel, generation) = self.begin_op(ItemState::Updating, force)?;
        self.mark_mutation_sent();
        let req = RequestParams { signal: cancel };
        let result = self.config.fetchers.update_item(new_item, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        match result {
            Ok(data) => self.install_fetched(data, false),
            Err(e) => {
                self.fail(&e.to_string());
                Err(CoreError::Updating(e))
            }
        }
    }

    pub async fn delete(&self, force: bool) -> Result<()> {
        if !force {
            if let Some(wait) = self.debounce_wait() {
                tokio::time::sleep(wait).await;
            }
        }
        let (cancel, generation) = self.begin_op(ItemState::Deleting, force)?;
        self.mark_mutation_sent();
        let req = RequestParams { signal: cancel };
        let id = self.id();
        let result = self.config.fetchers.delete_item(&id, &req).await;
        if !self.end_op(generation) {
            return Ok(());
        }
        match result {
            Ok(outcome) if outcome.success => {
                *self.state.write().unwrap() = ItemState::Deleted;
                self.emit(ItemQueryEvent::Deleted);
                self.emit(ItemQueryEvent::SelfDeleted);
                if let Some(sink) = &self.sink {
                    sink(SelfChange::Delete(id));
                }
                Ok(())
            }
            Ok(_) => {
                self.fail("server declined the deletion");
                Err(CoreError::UnsuccessfulDeletion)
            }
            Err(e) => {
                self.fail(&e.to_string());
                Err(CoreError::Deleting(e))
            }
        }
    }

    /// Ingest an update pushed from a sibling query or the root store.
    /// Emits `updated` only - never `selfUpdated`.
    pub fn set_one(&self, item: E) {
        *self.item.write().unwrap() = Some(Arc::new(item.clone()));
        *self.mutable.write().unwrap() = Some(item.clone());
        if !self.in_progress() {
            *self.state.write().unwrap() = ItemState::Actualized;
        }
        self.emit(ItemQueryEvent::Updated { item });
    }

    /// Ingest an externally observed deletion, if `id` matches this query's id.
    pub fn delete_one(&self, id: &EntityId) {
        if self.id() != *id {
            return;
        }
        if let Some(inflight) = self.inflight.write().unwrap().take() {
            inflight.cancel.cancel();
        }
        *self.state.write().unwrap() = ItemState::Deleted;
        self.progress_notify.notify_waiters();
        self.emit(ItemQueryEvent::Deleted);
    }
}
