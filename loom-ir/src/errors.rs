// PARSE ERROR
// ================================================================================================

/// Errors raised while decoding the serialised IR format (§6, §7). Never raised by
/// the in-memory tree operations themselves.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed IR document: {0}")]
    InvalidStructure(String),
    #[error("unknown expression type '{0}'")]
    UnknownExprType(String),
    #[error("missing required field '{field}' on '{node}'")]
    MissingRequiredField { node: String, field: String },
}
