//! Orchestrates one program's lifetime end to end (§4.H): load → lower →
//! annotate → transform → partition → per-backend compile → steady-state
//! per-frame execution. Defines the `Backend` trait embedding applications
//! implement to supply real codegen, and the shared runtime state — cross-domain
//! buffers and input state — that every backend instance reads and writes.

mod backend;
mod buffers;
mod config;
mod coordinator;
mod error;
mod input;

pub use backend::{Backend, CompiledUnit};
pub use buffers::CrossDomainBuffers;
pub use config::RuntimeConfig;
pub use coordinator::Coordinator;
pub use error::{CompileError, LoadError};
pub use input::InputState;
