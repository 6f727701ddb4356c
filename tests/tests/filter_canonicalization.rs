//! `spec.md` §8, scenario 4: two conjunctions built with children in a
//! different order simplify to the same canonical form and are each a
//! subset of the other.

mod common;

use common::Widget;
use ripple::{default_operator_key, is_filter_subset, simplify, FilterNode, PropertyGetter};

#[test]
fn order_independent_conjunctions_simplify_equal_and_are_mutual_subsets() {
    let a = FilterNode::<Widget>::and(vec![
        FilterNode::operator("eq", PropertyGetter::field("name"), "test"),
        FilterNode::operator("eq", PropertyGetter::field("value"), 1),
    ]);
    let b = FilterNode::<Widget>::and(vec![
        FilterNode::operator("eq", PropertyGetter::field("value"), 1),
        FilterNode::operator("eq", PropertyGetter::field("name"), "test"),
    ]);

    let sa = simplify(&a);
    let sb = simplify(&b);
    assert_eq!(sa, sb);
    assert!(is_filter_subset(Some(&sa), Some(&sb), &default_operator_key));
    assert!(is_filter_subset(Some(&sb), Some(&sa), &default_operator_key));
}

#[test]
fn simplify_is_idempotent() {
    let node = FilterNode::<Widget>::and(vec![
        FilterNode::operator("eq", PropertyGetter::field("name"), "test"),
        FilterNode::or(vec![
            FilterNode::operator("gt", PropertyGetter::field("value"), 1),
            FilterNode::operator("lt", PropertyGetter::field("value"), 0),
        ]),
    ]);
    let once = simplify(&node);
    let twice = ripple::canonicalize(&once);
    assert_eq!(once, twice);
}

#[test]
fn null_filter_is_a_subset_of_everything_and_nothing_is_a_subset_of_null() {
    let t = simplify(&FilterNode::<Widget>::operator("eq", PropertyGetter::field("name"), "test"));
    assert!(is_filter_subset(None, Some(&t), &default_operator_key));
    assert!(!is_filter_subset(Some(&t), None, &default_operator_key));
    assert!(is_filter_subset(Some(&t), Some(&t), &default_operator_key));
}
