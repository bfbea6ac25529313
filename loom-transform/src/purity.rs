use loom_ir::{any_node_matches, primitive_spec, Expr, ExprId, ExprPool, Spindle};

/// Does this subtree transitively touch a stateful built-in, a hardware-owning
/// built-in, a `Remap`, or a `CacheRead`? Used both by [`spindle_can_be_function`]
/// and by the temporal-remap-to-cache conversion's "does the base need caching"
/// check (§4.D).
pub fn references_stateful_signal(pool: &ExprPool, id: ExprId) -> bool {
    any_node_matches(pool, id, &|node| match node {
        Expr::Remap { .. } | Expr::CacheRead { .. } => true,
        Expr::Builtin { name, .. } => {
            primitive_spec(name).is_some_and(|spec| spec.stateful || !spec.hardware.is_empty())
        },
        _ => false,
    })
}

/// `spindleCanBeFunction` (§4.D): true iff no local or return expression contains a
/// stateful built-in, a `Remap`, a `CacheRead`, or a hardware-owning built-in — the
/// spindle is a pure mathematical function of its parameters and of `me`
/// coordinates, and a backend may emit it as a first-class function instead of
/// inlining it at every call site.
pub fn spindle_can_be_function(pool: &ExprPool, spindle: &Spindle) -> bool {
    spindle
        .returns
        .iter()
        .chain(spindle.locals.iter().flat_map(|local| local.strands.iter().map(|s| &s.expr)))
        .all(|&id| !references_stateful_signal(pool, id))
}
