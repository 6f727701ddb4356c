//! Entity identity: either a string or a number, produced by a declared
//! field name or a caller-supplied function.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    String(String),
    Number(i64),
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::String(s) => write!(f, "{s}"),
            EntityId::Number(n) => write!(f, "{n}"),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self { EntityId::String(s.to_string()) }
}
impl From<String> for EntityId {
    fn from(s: String) -> Self { EntityId::String(s) }
}
impl From<i64> for EntityId {
    fn from(n: i64) -> Self { EntityId::Number(n) }
}

/// How an entity's id is read off a value of `E`.
#[derive(Clone)]
pub enum IdGetter<E> {
    Field(String),
    Func(Arc<dyn Fn(&E) -> EntityId + Send + Sync>),
}

impl<E> IdGetter<E> {
    pub fn field(name: impl Into<String>) -> Self { IdGetter::Field(name.into()) }

    pub fn func(f: impl Fn(&E) -> EntityId + Send + Sync + 'static) -> Self { IdGetter::Func(Arc::new(f)) }

    pub fn get(&self, entity: &E) -> EntityId
    where E: Serialize {
        match self {
            IdGetter::Field(name) => {
                let value = serde_json::to_value(entity).ok();
                match value {
                    Some(Value::Object(map)) => match map.get(name) {
                        Some(Value::String(s)) => EntityId::String(s.clone()),
                        Some(Value::Number(n)) => EntityId::Number(n.as_i64().unwrap_or_default()),
                        _ => EntityId::String(String::new()),
                    },
                    _ => EntityId::String(String::new()),
                }
            }
            IdGetter::Func(f) => f(entity),
        }
    }
}
