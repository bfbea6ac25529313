use thiserror::Error;

/// Raised when a backend instance fails to compile a swatch (§7 "CompileError:
/// opaque string plus swatch id"). The reason is backend-defined and therefore
/// cannot be a structured variant set the way `LoweringError`/`ParseError` are —
/// every backend implementation funnels its own failures through this one shape.
#[derive(Debug, Clone, Error)]
#[error("backend '{backend:?}' failed to compile swatch #{swatch_index}: {message}")]
pub struct CompileError {
    pub swatch_index: usize,
    pub backend: Option<String>,
    pub message: String,
}

/// Every way loading a program can fail, aggregated so callers only match one
/// error type at the coordinator boundary (§7 "lowering errors abort the load").
#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Parse(#[from] loom_ir::ParseError),
    #[error(transparent)]
    Lowering(#[from] loom_lower::LoweringError),
    #[error(transparent)]
    Partition(#[from] loom_partition::PartitionError),
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error("no backend instance registered for swatch backend '{0}'")]
    MissingBackendInstance(String),
}
