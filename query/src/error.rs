use thiserror::Error;

/// Errors raised while compiling or evaluating filter/order descriptors.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryError {
    /// `compile` was given an operator name that isn't in the caller's operator map.
    #[error("unknown filter operator: {0}")]
    FilterOperatorNotFound(String),

    /// The primitive order comparator was handed two values it doesn't know
    /// how to compare (anything other than two strings, two numbers, or two
    /// date-like strings/numbers of the same shape).
    #[error("order comparator cannot compare {left} against {right}")]
    OrderTypeComparison { left: String, right: String },
}
