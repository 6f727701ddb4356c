/*!
Filter and order-by algebra shared by item and collection queries.

A filter is a tree of operator leaves (`eq`, `gt`, `contains`, ...) combined
with `and`/`or`/`not`. An order-by is a priority list of keys, each with a
direction and a nulls-placement policy. Both compile against a specific
entity type (predicates and comparators borrow entity fields directly) and
also reduce to an entity-type-erased canonical form, used to decide whether
two queries are asking for the same thing and whether one query's filter is
a syntactic subset of another's.
*/

pub mod error;
pub mod filter;
pub mod order;
pub mod property;

pub use error::QueryError;
pub use filter::{
    canonicalize, compare_simplified, compile, default_operator_key, default_operators, is_filter_subset, simplify,
    ConjKind, FilterNode, OperatorFn, OperatorMap, Predicate, SimplifiedFilter,
};
pub use order::{build_comparator, default_primitive_comparator, simplify_order_by, Comparator, Nulls, OrderBy, PrimitiveComparator, SimplifiedOrderBy};
pub use property::PropertyGetter;
