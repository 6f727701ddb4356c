//! The external collaborator contracts: fetch/create/update/delete callbacks
//! supplied per entity type. These are the only way the core talks to a
//! remote data source - transport, auth, and retries all live behind them.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::FetchError;
use crate::id::EntityId;
use ripple_query::{SimplifiedFilter, SimplifiedOrderBy};

/// Carried into every fetcher/mutator call. `signal` is cancelled when the
/// query preempts this operation (a `force=true` call, or a terminal
/// transition to `Deleted`); well-behaved fetchers should observe it and
/// abandon the in-flight request.
#[derive(Clone)]
pub struct RequestParams {
    pub signal: CancellationToken,
}

impl RequestParams {
    pub fn new() -> Self { Self { signal: CancellationToken::new() } }
}

impl Default for RequestParams {
    fn default() -> Self { Self::new() }
}

#[derive(Clone, Debug, Default)]
pub struct CollectionParams {
    pub filter: Option<SimplifiedFilter>,
    pub order: Vec<SimplifiedOrderBy>,
    pub meta: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct DeleteOutcome {
    pub id: EntityId,
    pub success: bool,
}

/// The five fetcher/mutator callbacks a caller supplies per entity type.
/// Batched variants are left to the caller to fold into these (e.g. a
/// `create_item` that accepts a one-element batch under the hood) since the
/// core only ever needs the per-item result.
#[async_trait]
pub trait Fetchers<E>: Send + Sync {
    async fn fetch_collection(&self, params: &CollectionParams, req: &RequestParams) -> Result<Vec<E>, FetchError>;
    async fn fetch_item(&self, id: &EntityId, meta: Option<&Value>, req: &RequestParams) -> Result<E, FetchError>;
    async fn create_item(&self, partial: E, req: &RequestParams) -> Result<E, FetchError>;
    async fn update_item(&self, item: E, req: &RequestParams) -> Result<E, FetchError>;
    async fn delete_item(&self, id: &EntityId, req: &RequestParams) -> Result<DeleteOutcome, FetchError>;
}
