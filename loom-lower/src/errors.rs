use thiserror::Error;

/// All failure modes of the lowering pass (§4.B, §7). One error is reported per
/// call; lowering aborts the load on the first one.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoweringError {
    #[error("unknown bundle '{0}'")]
    UnknownBundle(String),

    #[error("unknown strand '{strand}' on bundle '{bundle}'")]
    UnknownStrand { bundle: String, strand: String },

    #[error("unknown spindle '{0}'")]
    UnknownSpindle(String),

    #[error("width mismatch: expected {expected}, got {actual}")]
    WidthMismatch { expected: usize, actual: usize },

    #[error("range size mismatch: pattern output ranges disagree on size ({first} vs {other})")]
    RangeSizeMismatch { first: usize, other: usize },

    #[error("range endpoint out of width: index {index} outside width {width}")]
    RangeOutOfBounds { index: i64, width: usize },

    #[error("bare strand accessor used outside a chain pattern context")]
    BareStrandOutsidePattern,

    #[error("duplicate spindle '{0}'")]
    DuplicateSpindle(String),

    #[error("circular dependency among bundles: {0:?}")]
    CircularDependency(Vec<String>),

    #[error("arity mismatch calling '{spindle}': expected {expected} args, got {actual}")]
    ArityMismatch { spindle: String, expected: usize, actual: usize },

    #[error("invalid expression: {0}")]
    InvalidExpression(String),
}
