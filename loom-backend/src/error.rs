use thiserror::Error;

/// Failure modes for the registry itself (§4.G). Backend *execution* failures are
/// `CompileError`, owned by `loom-runtime` — this crate only fails at registration
/// time, before any program has compiled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend registry is already initialized, cannot register backend {0:?}")]
    AlreadyInitialized(String),
    #[error("a backend named {0:?} is already registered")]
    DuplicateIdentifier(String),
}
