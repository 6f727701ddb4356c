//! Compiling a "field name or function" descriptor into a callable getter.
//!
//! Entities are read generically through `serde_json::Value`: a field getter
//! serializes the entity and looks up a top-level key, and a function getter
//! runs caller-supplied logic. Both report a `key`, the canonical string used
//! to decide whether two getters are looking at the same slot (for filter
//! canonicalization and query deduplication).

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

/// A function getter's underlying closure.
pub type GetFn<E> = Arc<dyn Fn(&E) -> Value + Send + Sync>;

#[derive(Clone)]
enum Source<E> {
    Field(String),
    Func(GetFn<E>),
}

/// A compiled property accessor: `key` identifies the slot, `get` reads it.
#[derive(Clone)]
pub struct PropertyGetter<E> {
    pub key: String,
    source: Source<E>,
}

impl<E> PropertyGetter<E> {
    /// A getter that reads a top-level field by name.
    pub fn field(name: impl Into<String>) -> Self {
        let name = name.into();
        Self { key: name.clone(), source: Source::Field(name) }
    }

    /// A getter backed by arbitrary logic. `key` must be supplied by the
    /// caller since there's no field name to derive it from - two function
    /// getters are only considered the same slot if their keys match.
    pub fn func(key: impl Into<String>, get: impl Fn(&E) -> Value + Send + Sync + 'static) -> Self {
        Self { key: key.into(), source: Source::Func(Arc::new(get)) }
    }

    /// The canonical identifier for this getter, used by filter/order
    /// simplification to compare getters without running them.
    pub fn simplify(&self) -> String { self.key.clone() }

    /// Read this property off `entity`. Unlike the dynamically-typed
    /// original, `entity` is statically non-optional here, so there's no
    /// "getter invoked on a null entity" failure mode to guard against - the
    /// type system already rules it out.
    pub fn get(&self, entity: &E) -> Value
    where E: Serialize {
        match &self.source {
            Source::Field(name) => field_value(entity, name),
            Source::Func(f) => f(entity),
        }
    }
}

impl<E> PartialEq for PropertyGetter<E> {
    /// Getters are compared by `key` alone, per [`PropertyGetter::simplify`].
    fn eq(&self, other: &Self) -> bool { self.key == other.key }
}

fn field_value<E: Serialize>(entity: &E, field: &str) -> Value {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => map.get(field).cloned().unwrap_or(Value::Null),
        _ => Value::Null,
    }
}
