use std::collections::BTreeSet;

use crate::expr::{Expr, ExprId, ExprPool};

/// The set of `"bundle.strand"` keys (and bare bundle names, for dynamic indices)
/// an expression observes. A thin alias over `BTreeSet<String>` kept deterministic
/// for reproducible annotation-pass fixed points and testing.
pub type FreeVarSet = BTreeSet<String>;

// TREE OPERATIONS
// ================================================================================================

/// Returns the immediate children of a node. For `Remap` this is the base plus
/// every substitution value; for `Extract` it is the underlying call only (the
/// return-index literal is not a child).
pub fn visit_children(pool: &ExprPool, id: ExprId) -> Vec<ExprId> {
    match pool.get(id) {
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => Vec::new(),
        Expr::Index { index, .. } => vec![*index],
        Expr::Binary { left, right, .. } => vec![*left, *right],
        Expr::Unary { operand, .. } => vec![*operand],
        Expr::Call { args, .. } => args.clone(),
        Expr::Extract { call, .. } => vec![*call],
        Expr::Builtin { args, .. } => args.clone(),
        Expr::Remap { base, substitutions } => {
            let mut out = vec![*base];
            out.extend(substitutions.values().copied());
            out
        },
    }
}

/// Short-circuiting "does any node in this subtree (including the root) match
/// `pred`?".
pub fn any_node_matches(pool: &ExprPool, id: ExprId, pred: &dyn Fn(&Expr) -> bool) -> bool {
    if pred(pool.get(id)) {
        return true;
    }
    visit_children(pool, id).into_iter().any(|child| any_node_matches(pool, child, pred))
}

/// Produces a new (unallocated) node with each immediate child replaced by
/// `f(child)`. The caller is responsible for allocating the result into a pool;
/// recursive rewrites build bottom-up by calling this once per node on the way
/// back up the traversal (see `loom-transform`'s substitution passes).
pub fn map_children(pool: &ExprPool, id: ExprId, mut f: impl FnMut(ExprId) -> ExprId) -> Expr {
    match pool.get(id).clone() {
        node @ (Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. }) => node,
        Expr::Index { bundle, index, field } => {
            Expr::Index { bundle, index: f(index), field }
        },
        Expr::Binary { op, left, right } => Expr::Binary { op, left: f(left), right: f(right) },
        Expr::Unary { op, operand } => Expr::Unary { op, operand: f(operand) },
        Expr::Call { spindle, args } => {
            Expr::Call { spindle, args: args.into_iter().map(&mut f).collect() }
        },
        Expr::Extract { call, index } => Expr::Extract { call: f(call), index },
        Expr::Builtin { name, args } => {
            Expr::Builtin { name, args: args.into_iter().map(&mut f).collect() }
        },
        Expr::Remap { base, substitutions } => Expr::Remap {
            base: f(base),
            substitutions: substitutions.into_iter().map(|(k, v)| (k, f(v))).collect(),
        },
    }
}

// FREE VARIABLES
// ================================================================================================

fn static_index_key(pool: &ExprPool, bundle: &str, index: ExprId) -> Option<String> {
    match pool.get(index) {
        Expr::Num(n) => Some(format!("{bundle}.{}", n.get() as i64)),
        _ => None,
    }
}

/// The set of `"bundle.strand"` keys and bare bundle names this expression observes
/// in the current tick (§4.A).
pub fn free_vars(pool: &ExprPool, id: ExprId) -> FreeVarSet {
    match pool.get(id) {
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => FreeVarSet::new(),
        Expr::Index { bundle, index, .. } => {
            let mut set = FreeVarSet::new();
            match static_index_key(pool, bundle, *index) {
                Some(key) => {
                    set.insert(key);
                },
                None => {
                    set.insert(bundle.clone());
                    set.extend(free_vars(pool, *index));
                },
            }
            set
        },
        Expr::Remap { base, substitutions } => {
            let mut set = free_vars(pool, *base);
            for key in substitutions.keys() {
                set.remove(key);
            }
            for value in substitutions.values() {
                set.extend(free_vars(pool, *value));
            }
            set
        },
        _ => {
            let mut set = FreeVarSet::new();
            for child in visit_children(pool, id) {
                set.extend(free_vars(pool, child));
            }
            set
        },
    }
}

/// Whether a `Remap` substitutes `"me.t"` with an expression that itself observes
/// `"me.t"` — i.e. re-evaluates the base at a shifted time (§3 "Remap is temporal
/// iff...").
pub fn is_temporal_remap(pool: &ExprPool, base: ExprId, substitutions: &std::collections::BTreeMap<String, ExprId>) -> bool {
    let _ = base;
    match substitutions.get("me.t") {
        Some(t_sub) => free_vars(pool, *t_sub).contains("me.t"),
        None => false,
    }
}

/// As `free_vars`, but a temporal remap excludes the base's free vars entirely —
/// they refer to a previous tick and are resolved through the cache manager, not
/// observed directly this tick (§4.A).
pub fn current_tick_free_vars(pool: &ExprPool, id: ExprId) -> FreeVarSet {
    match pool.get(id) {
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => FreeVarSet::new(),
        Expr::Index { bundle, index, .. } => {
            let mut set = FreeVarSet::new();
            match static_index_key(pool, bundle, *index) {
                Some(key) => {
                    set.insert(key);
                },
                None => {
                    set.insert(bundle.clone());
                    set.extend(current_tick_free_vars(pool, *index));
                },
            }
            set
        },
        Expr::Remap { base, substitutions } => {
            if is_temporal_remap(pool, *base, substitutions) {
                let mut set = FreeVarSet::new();
                for value in substitutions.values() {
                    set.extend(current_tick_free_vars(pool, *value));
                }
                set
            } else {
                let mut set = current_tick_free_vars(pool, *base);
                for key in substitutions.keys() {
                    set.remove(key);
                }
                for value in substitutions.values() {
                    set.extend(current_tick_free_vars(pool, *value));
                }
                set
            }
        },
        _ => {
            let mut set = FreeVarSet::new();
            for child in visit_children(pool, id) {
                set.extend(current_tick_free_vars(pool, child));
            }
            set
        },
    }
}

// BUNDLE REFERENCES / BUILTIN QUERIES
// ================================================================================================

/// Names of every bundle this expression touches (by index or dynamic access),
/// optionally excluding `"me"`.
pub fn collect_bundle_references(pool: &ExprPool, id: ExprId, exclude_me: bool) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect_bundle_references_into(pool, id, exclude_me, &mut out);
    out
}

fn collect_bundle_references_into(
    pool: &ExprPool,
    id: ExprId,
    exclude_me: bool,
    out: &mut BTreeSet<String>,
) {
    if let Expr::Index { bundle, .. } = pool.get(id) {
        if !(exclude_me && bundle == "me") {
            out.insert(bundle.clone());
        }
    }
    for child in visit_children(pool, id) {
        collect_bundle_references_into(pool, child, exclude_me, out);
    }
}

/// Does this subtree invoke built-in `name` anywhere?
pub fn uses_builtin(pool: &ExprPool, id: ExprId, name: &str) -> bool {
    any_node_matches(pool, id, &|node| matches!(node, Expr::Builtin { name: n, .. } if n == name))
}

/// Does this subtree contain a spindle `Call` anywhere?
pub fn contains_call(pool: &ExprPool, id: ExprId) -> bool {
    any_node_matches(pool, id, &|node| matches!(node, Expr::Call { .. }))
}

/// Every distinct built-in name invoked anywhere in this subtree.
pub fn all_builtins(pool: &ExprPool, id: ExprId) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    all_builtins_into(pool, id, &mut out);
    out
}

fn all_builtins_into(pool: &ExprPool, id: ExprId, out: &mut BTreeSet<String>) {
    if let Expr::Builtin { name, .. } = pool.get(id) {
        out.insert(name.clone());
    }
    for child in visit_children(pool, id) {
        all_builtins_into(pool, child, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOp;

    fn idx(pool: &mut ExprPool, bundle: &str, i: f64) -> ExprId {
        let index = pool.alloc(Expr::Num(i.into()));
        pool.alloc(Expr::Index { bundle: bundle.into(), index, field: None })
    }

    #[test]
    fn free_vars_of_static_index() {
        let mut pool = ExprPool::new();
        let e = idx(&mut pool, "a", 2.0);
        assert_eq!(free_vars(&pool, e), FreeVarSet::from(["a.2".to_string()]));
    }

    #[test]
    fn free_vars_of_dynamic_index_is_whole_bundle_plus_index_expr() {
        let mut pool = ExprPool::new();
        let sel = idx(&mut pool, "i", 0.0);
        let dynamic = pool.alloc(Expr::Index { bundle: "a".into(), index: sel, field: None });
        let fv = free_vars(&pool, dynamic);
        assert!(fv.contains("a"));
        assert!(fv.contains("i.0"));
    }

    #[test]
    fn remap_subtracts_substituted_keys() {
        let mut pool = ExprPool::new();
        let base = idx(&mut pool, "env", 0.0);
        let shift = pool.alloc(Expr::Num((-1.0).into()));
        let mut subs = std::collections::BTreeMap::new();
        subs.insert("env.0".to_string(), shift);
        let remap = pool.alloc(Expr::Remap { base, substitutions: subs });
        let fv = free_vars(&pool, remap);
        assert!(!fv.contains("env.0"));
    }

    #[test]
    fn current_tick_free_vars_excludes_temporal_remap_base() {
        let mut pool = ExprPool::new();
        let base = idx(&mut pool, "signal", 0.0);
        let t_index = pool.alloc(Expr::Num(0.0.into()));
        let t = pool.alloc(Expr::Index { bundle: "me".into(), index: t_index, field: Some("t".into()) });
        let one = pool.alloc(Expr::Num(1.0.into()));
        let shifted = pool.alloc(Expr::Binary { op: BinaryOp::Sub, left: t, right: one });
        let mut subs = std::collections::BTreeMap::new();
        subs.insert("me.t".to_string(), shifted);
        let remap = pool.alloc(Expr::Remap { base, substitutions: subs });

        assert!(free_vars(&pool, remap).contains("signal.0"));
        assert!(!current_tick_free_vars(&pool, remap).contains("signal.0"));
    }

    #[test]
    fn cache_read_has_no_free_vars() {
        let mut pool = ExprPool::new();
        let read = pool.alloc(Expr::CacheRead { cache_id: 0, tap_index: 0 });
        assert!(free_vars(&pool, read).is_empty());
    }

    #[test]
    fn property_free_vars_superset_of_current_tick_free_vars() {
        let mut pool = ExprPool::new();
        let a = idx(&mut pool, "a", 0.0);
        let b = idx(&mut pool, "b", 1.0);
        let sum = pool.alloc(Expr::Binary { op: BinaryOp::Add, left: a, right: b });
        let fv = free_vars(&pool, sum);
        let ctfv = current_tick_free_vars(&pool, sum);
        assert!(ctfv.is_subset(&fv));
    }

    #[test]
    fn map_children_identity_preserves_shape() {
        let mut pool = ExprPool::new();
        let a = idx(&mut pool, "a", 0.0);
        let b = idx(&mut pool, "b", 1.0);
        let sum = pool.alloc(Expr::Binary { op: BinaryOp::Add, left: a, right: b });
        let mapped = map_children(&pool, sum, |child| child);
        assert_eq!(mapped, pool.get(sum).clone());
    }
}
