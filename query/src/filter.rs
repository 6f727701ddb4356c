//! Filter descriptors: operator leaves and and/or/not conjunctions, compiled
//! to predicates and simplified to a canonical, entity-type-erased form used
//! for query deduplication and parent-query subset seeding.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::QueryError;
use crate::property::PropertyGetter;

/// `and` is satisfied when every child is; `or` when any is; `not` negates
/// its single child.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConjKind {
    And,
    Or,
    Not,
}

impl ConjKind {
    fn type_name(self) -> &'static str {
        match self {
            ConjKind::And => "and",
            ConjKind::Or => "or",
            ConjKind::Not => "not",
        }
    }
}

/// A filter descriptor, generic over the entity type it will eventually be
/// compiled against. Build these with [`FilterNode::operator`], [`FilterNode::and`],
/// [`FilterNode::or`], and [`FilterNode::not`].
#[derive(Clone)]
pub enum FilterNode<E> {
    Operator { op: String, value: PropertyGetter<E>, test: Value },
    Conjunction { kind: ConjKind, operations: Vec<FilterNode<E>> },
}

impl<E> FilterNode<E> {
    pub fn operator(op: impl Into<String>, value: PropertyGetter<E>, test: impl Into<Value>) -> Self {
        FilterNode::Operator { op: op.into(), value, test: test.into() }
    }

    pub fn and(operations: Vec<FilterNode<E>>) -> Self {
        FilterNode::Conjunction { kind: ConjKind::And, operations }
    }

    pub fn or(operations: Vec<FilterNode<E>>) -> Self {
        FilterNode::Conjunction { kind: ConjKind::Or, operations }
    }

    /// `not` always has exactly one operand; taking it directly rather than
    /// a `Vec` makes the arity mismatch the spec warns about unrepresentable.
    pub fn not(operand: FilterNode<E>) -> Self {
        FilterNode::Conjunction { kind: ConjKind::Not, operations: vec![operand] }
    }
}

/// A compiled predicate over entities of type `E`.
pub type Predicate<E> = Box<dyn Fn(&E) -> bool + Send + Sync>;

/// A named binary predicate, e.g. `eq`, `gt`, `contains`.
pub type OperatorFn = Arc<dyn Fn(&Value, &Value) -> bool + Send + Sync>;

/// Maps operator names to their implementations. Pass a custom map to
/// [`compile`] to add or override operators; [`default_operators`] covers the
/// common set.
pub type OperatorMap = HashMap<String, OperatorFn>;

/// The operator set exercised by the original test suite: equality,
/// ordering, string containment/prefix/suffix, and list membership.
pub fn default_operators() -> OperatorMap {
    let mut ops: OperatorMap = HashMap::new();
    ops.insert("eq".into(), Arc::new(|a, b| a == b));
    ops.insert("neq".into(), Arc::new(|a, b| a != b));
    ops.insert("gt".into(), Arc::new(|a, b| numeric_cmp(a, b) == Some(Ordering::Greater)));
    ops.insert("gte".into(), Arc::new(|a, b| matches!(numeric_cmp(a, b), Some(Ordering::Greater) | Some(Ordering::Equal))));
    ops.insert("lt".into(), Arc::new(|a, b| numeric_cmp(a, b) == Some(Ordering::Less)));
    ops.insert("lte".into(), Arc::new(|a, b| matches!(numeric_cmp(a, b), Some(Ordering::Less) | Some(Ordering::Equal))));
    ops.insert("contains".into(), Arc::new(contains));
    ops.insert("startsWith".into(), Arc::new(|a, b| match (a, b) {
        (Value::String(a), Value::String(b)) => a.starts_with(b.as_str()),
        _ => false,
    }));
    ops.insert("endsWith".into(), Arc::new(|a, b| match (a, b) {
        (Value::String(a), Value::String(b)) => a.ends_with(b.as_str()),
        _ => false,
    }));
    ops.insert("in".into(), Arc::new(|a, b| match b {
        Value::Array(items) => items.contains(a),
        _ => false,
    }));
    ops.insert("notIn".into(), Arc::new(|a, b| match b {
        Value::Array(items) => !items.contains(a),
        _ => true,
    }));
    ops
}

fn numeric_cmp(a: &Value, b: &Value) -> Option<Ordering> {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b),
        _ => match (a.as_str(), b.as_str()) {
            (Some(a), Some(b)) => Some(a.cmp(b)),
            _ => None,
        },
    }
}

fn contains(a: &Value, b: &Value) -> bool {
    match a {
        Value::String(s) => b.as_str().is_some_and(|needle| s.contains(needle)),
        Value::Array(items) => items.contains(b),
        _ => false,
    }
}

/// Compile a descriptor into a predicate, resolving operator names against
/// `operators`. Fails if any leaf names an operator not present in the map.
pub fn compile<E>(operators: &OperatorMap, node: &FilterNode<E>) -> Result<Predicate<E>, QueryError>
where E: Serialize + 'static {
    match node {
        FilterNode::Operator { op, value, test } => {
            let f = operators.get(op).cloned().ok_or_else(|| QueryError::FilterOperatorNotFound(op.clone()))?;
            let value = value.clone();
            let test = test.clone();
            Ok(Box::new(move |entity: &E| f(&value.get(entity), &test)))
        }
        FilterNode::Conjunction { kind, operations } => {
            let compiled: Vec<Predicate<E>> =
                operations.iter().map(|child| compile(operators, child)).collect::<Result<_, _>>()?;
            match kind {
                ConjKind::And => Ok(Box::new(move |entity: &E| compiled.iter().all(|p| p(entity)))),
                ConjKind::Or => Ok(Box::new(move |entity: &E| compiled.iter().any(|p| p(entity)))),
                ConjKind::Not => {
                    let mut compiled = compiled;
                    let inner = compiled.pop().expect("not always has exactly one operand");
                    Ok(Box::new(move |entity: &E| !inner(entity)))
                }
            }
        }
    }
}

/// The entity-type-erased, canonical form of a [`FilterNode`]: operator
/// leaves keep only their getter's `key` (not the getter itself), and
/// conjunction children are sorted into a deterministic order so two
/// descriptors built in a different operand order still compare equal.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SimplifiedFilter {
    Operator { op: String, key: String, test: Value },
    Conjunction { kind: ConjKind, operations: Vec<SimplifiedFilter> },
}

/// Reduce a descriptor to its canonical form.
pub fn simplify<E>(node: &FilterNode<E>) -> SimplifiedFilter {
    match node {
        FilterNode::Operator { op, value, test } => {
            SimplifiedFilter::Operator { op: op.clone(), key: value.simplify(), test: test.clone() }
        }
        FilterNode::Conjunction { kind, operations } => {
            let mut operations: Vec<SimplifiedFilter> = operations.iter().map(simplify).collect();
            operations.sort_by(compare_simplified);
            SimplifiedFilter::Conjunction { kind: *kind, operations }
        }
    }
}

/// Re-sort an already-simplified tree. Calling this on output of [`simplify`]
/// is a no-op - this is what makes simplification idempotent.
pub fn canonicalize(node: &SimplifiedFilter) -> SimplifiedFilter {
    match node {
        SimplifiedFilter::Operator { .. } => node.clone(),
        SimplifiedFilter::Conjunction { kind, operations } => {
            let mut operations: Vec<SimplifiedFilter> = operations.iter().map(canonicalize).collect();
            operations.sort_by(compare_simplified);
            SimplifiedFilter::Conjunction { kind: *kind, operations }
        }
    }
}

fn json_key(v: &Value) -> String { serde_json::to_string(v).unwrap_or_default() }

/// Total order over simplified nodes: operator leaves sort before
/// conjunctions; operators compare by `(key, op, json(test))`; conjunctions
/// compare by `(type name, operand count, operands lexicographically)`.
pub fn compare_simplified(a: &SimplifiedFilter, b: &SimplifiedFilter) -> Ordering {
    use SimplifiedFilter::*;
    match (a, b) {
        (Operator { .. }, Conjunction { .. }) => Ordering::Less,
        (Conjunction { .. }, Operator { .. }) => Ordering::Greater,
        (Operator { op: oa, key: ka, test: ta }, Operator { op: ob, key: kb, test: tb }) => {
            ka.cmp(kb).then_with(|| oa.cmp(ob)).then_with(|| json_key(ta).cmp(&json_key(tb)))
        }
        (Conjunction { kind: ka, operations: oa }, Conjunction { kind: kb, operations: ob }) => ka
            .type_name()
            .cmp(kb.type_name())
            .then_with(|| oa.len().cmp(&ob.len()))
            .then_with(|| {
                for (x, y) in oa.iter().zip(ob.iter()) {
                    let c = compare_simplified(x, y);
                    if c != Ordering::Equal {
                        return c;
                    }
                }
                Ordering::Equal
            }),
    }
}

/// Default `getOperatorKey`: the JSON-stringified test value. Supply a
/// different function to [`is_filter_subset`] when two operator nodes with
/// different `test` values should still be treated as the same constraint
/// (e.g. comparing against a live variable rather than its current value).
pub fn default_operator_key(node: &SimplifiedFilter) -> String {
    match node {
        SimplifiedFilter::Operator { test, .. } => json_key(test),
        SimplifiedFilter::Conjunction { .. } => String::new(),
    }
}

/// Is `candidate` guaranteed to match only entities that `target` also
/// matches? Used to decide whether a new collection query's live set can be
/// seeded from an existing parent query's results instead of refetched.
///
/// This is a conservative syntactic approximation, not a semantic proof: a
/// `false` result may still be a true subset relation the checker can't see.
/// `None` (no filter) matches everything, so it's a superset of every filter
/// and a subset of nothing but itself.
pub fn is_filter_subset(
    candidate: Option<&SimplifiedFilter>,
    target: Option<&SimplifiedFilter>,
    get_operator_key: &dyn Fn(&SimplifiedFilter) -> String,
) -> bool {
    match (candidate, target) {
        (None, _) => true,
        (Some(_), None) => false,
        (Some(c), Some(t)) => node_subset(&as_root_conjunction(c), &as_root_conjunction(t), get_operator_key),
    }
}

/// A filter descriptor's root is always a conjunction (§3), but callers may
/// build (and this crate's own `CollectionQuery`/`EntityStore` accept) a bare
/// operator as a one-clause shorthand. Normalize that shorthand to a
/// singleton `and` before comparing, so root-level bare operators and their
/// one-child `and` equivalent are treated identically by subset checks.
fn as_root_conjunction(node: &SimplifiedFilter) -> SimplifiedFilter {
    match node {
        SimplifiedFilter::Operator { .. } => SimplifiedFilter::Conjunction { kind: ConjKind::And, operations: vec![node.clone()] },
        SimplifiedFilter::Conjunction { .. } => node.clone(),
    }
}

fn node_subset(
    candidate: &SimplifiedFilter,
    target: &SimplifiedFilter,
    key_fn: &dyn Fn(&SimplifiedFilter) -> String,
) -> bool {
    use SimplifiedFilter::*;
    match (candidate, target) {
        (Operator { .. }, Operator { .. }) => nodes_equivalent(candidate, target, key_fn),
        (Conjunction { kind: kc, operations: oc }, Conjunction { kind: kt, operations: ot }) => {
            if kc != kt {
                return false;
            }
            // `and`: candidate is narrower than target when every constraint
            // target demands is already present (up to equivalence) among
            // candidate's own clauses - candidate may carry extra clauses
            // beyond that and remain a subset. `or`: dual - candidate is
            // narrower than target when every one of candidate's own
            // disjuncts is already covered by some target disjunct; target
            // may offer extra alternatives candidate never uses.
            match kc {
                ConjKind::And => ot.iter().all(|t| oc.iter().any(|c| nodes_equivalent(c, t, key_fn))),
                ConjKind::Or => oc.iter().all(|c| ot.iter().any(|t| nodes_equivalent(c, t, key_fn))),
                ConjKind::Not => nodes_equivalent(&oc[0], &ot[0], key_fn),
            }
        }
        _ => false,
    }
}

/// Two nodes are equivalent when each is a subset of the other. For operator
/// leaves this reduces to the `(key, op, getOperatorKey)` agreement rule; for
/// conjunctions it recurses structurally.
fn nodes_equivalent(
    a: &SimplifiedFilter,
    b: &SimplifiedFilter,
    key_fn: &dyn Fn(&SimplifiedFilter) -> String,
) -> bool {
    use SimplifiedFilter::*;
    match (a, b) {
        (Operator { op: oa, key: ka, .. }, Operator { op: ob, key: kb, .. }) => {
            oa == ob && ka == kb && key_fn(a) == key_fn(b)
        }
        (Conjunction { .. }, Conjunction { .. }) => node_subset(a, b, key_fn) && node_subset(b, a, key_fn),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Serialize)]
    struct Item {
        status: String,
        priority: i64,
    }

    fn status(test: &str) -> FilterNode<Item> {
        FilterNode::operator("eq", PropertyGetter::field("status"), Value::from(test))
    }

    fn priority_gt(n: i64) -> FilterNode<Item> {
        FilterNode::operator("gt", PropertyGetter::field("priority"), Value::from(n))
    }

    #[test]
    fn compile_evaluates_and_or_not() {
        let ops = default_operators();
        let node = FilterNode::and(vec![status("open"), priority_gt(3)]);
        let pred = compile(&ops, &node).unwrap();
        assert!(pred(&Item { status: "open".into(), priority: 4 }));
        assert!(!pred(&Item { status: "open".into(), priority: 2 }));
        assert!(!pred(&Item { status: "closed".into(), priority: 4 }));

        let not_open = compile(&ops, &FilterNode::not(status("open"))).unwrap();
        assert!(not_open(&Item { status: "closed".into(), priority: 0 }));
        assert!(!not_open(&Item { status: "open".into(), priority: 0 }));
    }

    #[test]
    fn unknown_operator_fails_to_compile() {
        let ops = default_operators();
        let node = FilterNode::<Item>::operator("bogus", PropertyGetter::field("status"), Value::from("x"));
        assert!(matches!(compile(&ops, &node), Err(QueryError::FilterOperatorNotFound(op)) if op == "bogus"));
    }

    #[test]
    fn simplify_is_order_independent_and_idempotent() {
        let a = FilterNode::and(vec![status("open"), priority_gt(3)]);
        let b = FilterNode::and(vec![priority_gt(3), status("open")]);
        let sa = simplify(&a);
        let sb = simplify(&b);
        assert_eq!(sa, sb);
        assert_eq!(canonicalize(&sa), sa);
    }

    #[test]
    fn subset_relation_basics() {
        let target = simplify(&FilterNode::and(vec![status("open"), priority_gt(3)]));
        let candidate = simplify(&FilterNode::and(vec![status("open"), priority_gt(3), priority_gt(5)]));

        assert!(is_filter_subset(Some(&candidate), Some(&target), &default_operator_key));
        assert!(!is_filter_subset(Some(&target), Some(&candidate), &default_operator_key));
        assert!(is_filter_subset(None, Some(&target), &default_operator_key));
        assert!(!is_filter_subset(Some(&target), None, &default_operator_key));
        assert!(is_filter_subset(Some(&target), Some(&target), &default_operator_key));
    }

    #[test]
    fn mismatched_top_level_kind_is_never_a_subset() {
        let and_node = simplify(&FilterNode::and(vec![status("open")]));
        let or_node = simplify(&FilterNode::or(vec![status("open")]));
        assert!(!is_filter_subset(Some(&and_node), Some(&or_node), &default_operator_key));
    }

    #[test]
    fn bare_operator_root_is_compared_as_a_singleton_and() {
        // A new collection's filter is `status = "open" AND priority > 3`; an
        // existing collection's filter is the bare operator `status = "open"`.
        // The new one must seed from the existing one without a fetch.
        let target = simplify(&status("open"));
        let candidate = simplify(&FilterNode::and(vec![status("open"), priority_gt(3)]));
        assert!(is_filter_subset(Some(&candidate), Some(&target), &default_operator_key));
        assert!(!is_filter_subset(Some(&target), Some(&candidate), &default_operator_key));
    }
}
