//! The `loom-ir` crate defines the intermediate representation shared by every later
//! stage of the pipeline: a typed expression tree, the bundle/spindle/program data
//! model, cache descriptors, and the tree operations (traversal, substitution,
//! free-variable analysis) everything else is built on.
//!
//! Nothing in this crate performs analysis or codegen; it only models the tree and
//! walks it. See `loom-lower` for AST-to-IR lowering, `loom-annotate` for the
//! fixed-point hardware/purity pass, and `loom-transform`/`loom-cache` for the
//! rewrites that run on top of this representation.

mod coord;
mod errors;
mod expr;
mod hardware;
mod ops;
mod primitive;
mod program;
mod serde_ir;

#[cfg(any(test, feature = "testing"))]
pub mod eval;

pub use coord::{AccessMode, CoordAxis};
pub use errors::ParseError;
pub use expr::{BinaryOp, Expr, ExprId, ExprPool, UnaryOp};
pub use hardware::HardwareToken;
pub use ops::{
    all_builtins, any_node_matches, collect_bundle_references, contains_call,
    current_tick_free_vars, free_vars, is_temporal_remap, map_children, uses_builtin,
    visit_children, FreeVarSet,
};
pub use primitive::{primitive_spec, Arity, PrimitiveSpec};
pub use program::{
    Bundle, CacheDescriptor, CacheDomain, OrderEntry, Program, Spindle, Strand, StrandLocation,
};
pub use serde_ir::{deserialize_expr, deserialize_program, serialize_expr, serialize_program};
