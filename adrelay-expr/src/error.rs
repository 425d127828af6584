use thiserror::Error;

/// Errors from the expression evaluator and template renderer.
///
/// Per spec.md §4.1, a malformed expression never aborts an adapter
/// render -- it resolves to `Value::Null` / an empty string instead.
/// This type exists for the handful of cases (currently none at the
/// public API) where a caller wants to distinguish "evaluated to null"
/// from "could not be evaluated at all".
#[derive(Debug, Error)]
pub enum ExprError {
    #[error("unsupported expression form: {0}")]
    Unsupported(String),
}
