//! Order descriptors: a priority list of keys, each with a sort direction
//! and a nulls-placement policy, compiled into a comparator.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::property::PropertyGetter;

/// Where a missing (`null`) value sorts relative to present ones, for a
/// given key in the priority list.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nulls {
    First,
    Last,
}

/// One key in an order-by priority list.
#[derive(Clone)]
pub struct OrderBy<E> {
    pub key: PropertyGetter<E>,
    pub desc: bool,
    pub nulls: Nulls,
}

impl<E> OrderBy<E> {
    /// Ascending, nulls last - the common default.
    pub fn new(key: PropertyGetter<E>) -> Self { Self { key, desc: false, nulls: Nulls::Last } }

    pub fn desc(mut self) -> Self {
        self.desc = true;
        self
    }

    pub fn nulls(mut self, nulls: Nulls) -> Self {
        self.nulls = nulls;
        self
    }
}

/// The entity-type-erased form of an [`OrderBy`] priority list, used as a
/// dedup/equality key the same way [`crate::filter::SimplifiedFilter`] is.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimplifiedOrderBy {
    pub key: String,
    pub desc: bool,
    pub nulls: Nulls,
}

pub fn simplify_order_by<E>(priority: &[OrderBy<E>]) -> Vec<SimplifiedOrderBy> {
    priority.iter().map(|o| SimplifiedOrderBy { key: o.key.simplify(), desc: o.desc, nulls: o.nulls }).collect()
}

/// Compares two non-null property values of presumably-matching shape.
/// Strings compare byte-wise; numbers compare numerically; anything else
/// (mismatched types, booleans, objects, arrays) is refused.
pub type PrimitiveComparator = fn(&Value, &Value) -> Result<Ordering, QueryError>;

/// Dates have no dedicated `Value` variant (`serde_json::Value` has no
/// `Date`), so "epoch diff" is implemented by the `Number` arm: a
/// `PropertyGetter` that projects a date as epoch-millisecond (or any other
/// fixed epoch unit) compares correctly here without any date-specific code.
/// An ISO-8601 string date instead falls into the `String` arm and compares
/// lexicographically, not chronologically - there is no implicit conversion.
pub fn default_primitive_comparator(a: &Value, b: &Value) -> Result<Ordering, QueryError> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Ok(x.as_str().cmp(y.as_str())),
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64(), y.as_f64());
            match (x, y) {
                (Some(x), Some(y)) => x.partial_cmp(&y).ok_or_else(|| type_error(a, b)),
                _ => Err(type_error(a, b)),
            }
        }
        (Value::Bool(x), Value::Bool(y)) => Ok(x.cmp(y)),
        _ => Err(type_error(a, b)),
    }
}

fn type_error(a: &Value, b: &Value) -> QueryError {
    QueryError::OrderTypeComparison { left: a.to_string(), right: b.to_string() }
}

/// A compiled total-order comparator over entities of type `E`. Returns
/// `Err` rather than panicking or silently treating mismatched values as
/// equal, so a bad comparison surfaces to the caller (typically aborting a
/// collection query's initial sort) instead of producing a scrambled order.
pub type Comparator<E> = Arc<dyn Fn(&E, &E) -> Result<Ordering, QueryError> + Send + Sync>;

/// Compile a priority list into a single comparator: ties at each key fall
/// through to the next, in list order. A value of `null` for a key is placed
/// first or last per that key's [`Nulls`] policy and never reaches
/// `primitive` - two nulls at the same key are always equal.
pub fn build_comparator<E>(primitive: PrimitiveComparator, priority: Vec<OrderBy<E>>) -> Comparator<E>
where E: Serialize + 'static {
    Arc::new(move |a: &E, b: &E| {
        for ob in &priority {
            let va = ob.key.get(a);
            let vb = ob.key.get(b);
            let ord = match (va.is_null(), vb.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => nulls_ordering(ob.nulls, true),
                (false, true) => nulls_ordering(ob.nulls, false),
                (false, false) => {
                    let cmp = primitive(&va, &vb)?;
                    if ob.desc { cmp.reverse() } else { cmp }
                }
            };
            if ord != Ordering::Equal {
                return Ok(ord);
            }
        }
        Ok(Ordering::Equal)
    })
}

/// `a_is_null` tells us which side is the null one; the other is non-null.
fn nulls_ordering(policy: Nulls, a_is_null: bool) -> Ordering {
    let a_sorts_first = match policy {
        Nulls::First => a_is_null,
        Nulls::Last => !a_is_null,
    };
    if a_sorts_first { Ordering::Less } else { Ordering::Greater }
}
