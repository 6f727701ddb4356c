//! Error kinds surfaced by item and collection queries.
//!
//! Every kind below is reachable from normal operation except [`CoreError::Internal`],
//! which marks an invariant violation - always a bug in this crate, never a
//! caller mistake.

use std::fmt;

use thiserror::Error;

use ripple_query::QueryError;

/// A boxed fetcher/mutator failure, opaque to the core - it only needs to be
/// displayed and chained, never inspected.
pub type FetchError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Caller read `data`/`mutable` before the query had a value.
    #[error("query has no data yet")]
    NotReady,

    /// Caller read `mutable` on a query whose item has been deleted.
    #[error("item has been deleted")]
    DeletedItem,

    /// The fetcher rejected during a fetch or refetch.
    #[error("fetch failed: {0}")]
    Fetching(#[source] FetchError),

    /// The mutator rejected an update.
    #[error("update failed: {0}")]
    Updating(#[source] FetchError),

    /// The deleter rejected.
    #[error("delete failed: {0}")]
    Deleting(#[source] FetchError),

    /// The deleter completed without error but reported `success: false`.
    #[error("server declined the deletion")]
    UnsuccessfulDeletion,

    /// Caller passed an item whose id differs from the tracked id and
    /// `trust_query` is off.
    #[error("item id {given} does not match tracked id {tracked}")]
    IdMismatch { tracked: String, given: String },

    /// Server returned an item with a different id than requested, with
    /// `trust_query` on but not in dev mode (in dev mode this is only logged).
    #[error("server returned id {server} for requested id {requested}")]
    TrustIdMismatch { requested: String, server: String },

    /// A non-forced operation was attempted while an incompatible one was in flight.
    #[error("an incompatible operation is already running")]
    AlreadyRunning,

    /// An operation other than create-completion was attempted on a query still `Creating`.
    #[error("query has not finished being created")]
    NotCreated,

    #[error(transparent)]
    Query(#[from] QueryError),

    /// Invariant violation - always a bug.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Wraps a plain message as a [`std::error::Error`], for reporting a prior
/// failure (read out of `lastError`) through a fresh [`FetchError`]-shaped slot.
#[derive(Debug)]
pub struct Reported(pub String);

impl fmt::Display for Reported {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

impl std::error::Error for Reported {}
