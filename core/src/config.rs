//! Per-entity and per-store configuration.

use std::sync::Arc;
use std::time::Duration;

use crate::contracts::Fetchers;
use crate::id::IdGetter;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Info,
    Debug,
}

/// The `debug` section referenced throughout the original material with
/// varying, inconsistent shapes; here it's a plain struct with an explicit
/// level enum rather than the ad-hoc `"off"`/`"info"`/`false` union it was
/// found in.
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Name used to tag this store's log lines.
    pub name: String,
    pub dev_mode: bool,
    pub log_level: LogLevel,
}

impl Default for DebugConfig {
    fn default() -> Self { Self { name: "ripple".into(), dev_mode: false, log_level: LogLevel::Off } }
}

/// The `defaults` section: store-wide fallbacks for the knobs that make
/// sense to share across every entity (`name`/`id_getter`/`fetchers` are
/// inherently per-entity and have no sensible shared default). A field left
/// `None` here simply means "no store-wide opinion" - the per-entity value
/// from `EntityConfig::new` stands.
#[derive(Clone, Debug, Default)]
pub struct StoreDefaults {
    pub trust_query: Option<bool>,
    pub update_debounce: Option<Duration>,
    pub dev_mode: Option<bool>,
}

/// Full configuration for one declared entity type.
#[derive(Clone)]
pub struct EntityConfig<E> {
    pub name: String,
    pub id_getter: IdGetter<E>,
    pub fetchers: Arc<dyn Fetchers<E>>,
    /// Skip client-side re-filter/re-sort and id-mismatch checks on server responses.
    pub trust_query: bool,
    /// Minimum interval between self-initiated mutations being coalesced. Zero
    /// disables coalescing. Policy is drop-latest: a mutation requested less
    /// than `update_debounce` after the previous one reached the network
    /// waits out the remainder of the window before proceeding, at which
    /// point it is subject to the ordinary (non-debounce) concurrency rules -
    /// see `ItemQuery::debounce_wait`.
    pub update_debounce: Duration,
    pub dev_mode: bool,
    trust_query_set: bool,
    update_debounce_set: bool,
    dev_mode_set: bool,
}

impl<E> EntityConfig<E> {
    pub fn new(name: impl Into<String>, id_getter: IdGetter<E>, fetchers: Arc<dyn Fetchers<E>>) -> Self {
        Self {
            name: name.into(),
            id_getter,
            fetchers,
            trust_query: false,
            update_debounce: Duration::ZERO,
            dev_mode: false,
            trust_query_set: false,
            update_debounce_set: false,
            dev_mode_set: false,
        }
    }

    pub fn trust_query(mut self, trust: bool) -> Self {
        self.trust_query = trust;
        self.trust_query_set = true;
        self
    }

    pub fn update_debounce(mut self, debounce: Duration) -> Self {
        self.update_debounce = debounce;
        self.update_debounce_set = true;
        self
    }

    pub fn dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self.dev_mode_set = true;
        self
    }

    /// Fill in any of `trust_query`/`update_debounce`/`dev_mode` this config
    /// hasn't explicitly set from the store's `defaults` section. Explicit
    /// per-entity values always win; a field the `defaults` section leaves
    /// `None` is left alone either way.
    pub fn with_defaults(mut self, defaults: &StoreDefaults) -> Self {
        if !self.trust_query_set {
            if let Some(trust_query) = defaults.trust_query {
                self.trust_query = trust_query;
            }
        }
        if !self.update_debounce_set {
            if let Some(update_debounce) = defaults.update_debounce {
                self.update_debounce = update_debounce;
            }
        }
        if !self.dev_mode_set {
            if let Some(dev_mode) = defaults.dev_mode {
                self.dev_mode = dev_mode;
            }
        }
        self
    }

    /// Apply the store's `debug` section. Unlike `defaults`, `debug` is a
    /// forced override, not a fallback: it always wins over both the
    /// per-entity value and the `defaults` section, the same way flipping on
    /// a debug build overrides whatever a component asked for individually.
    pub fn with_debug(mut self, debug: &DebugConfig) -> Self {
        self.dev_mode = debug.dev_mode;
        self.dev_mode_set = true;
        self
    }
}
