use std::collections::BTreeMap;

use loom_ir::{Expr, ExprId, ExprPool};

/// A binding a scalar `Param(name)` node resolves to.
#[derive(Debug, Clone)]
pub enum ParamSubst {
    Value(ExprId),
    /// Redirects every `Index(bundle, _)` whose bundle equals the keyed name to a
    /// different bundle name, used when a spindle local is aliased to a
    /// caller-supplied reference rather than a computed value.
    BundleAlias(String),
}

/// The combined substitution built for one spindle call or remap resolution:
/// `params` replaces `Param` nodes by name; `locals` replaces `Index(bundle,
/// index/field)` nodes whose `"bundle.index"` or `"bundle.field"` key matches (§4.D
/// "build spindle substitutions" and "coordinate substitution").
#[derive(Debug, Clone, Default)]
pub struct Substitution {
    pub params: BTreeMap<String, ParamSubst>,
    pub locals: BTreeMap<String, ExprId>,
}

fn index_key(pool: &ExprPool, bundle: &str, index: ExprId, field: &Option<String>) -> Option<String> {
    if let Some(f) = field {
        return Some(format!("{bundle}.{f}"));
    }
    if let Expr::Num(n) = pool.get(index) {
        return Some(format!("{bundle}.{}", n.get() as i64));
    }
    None
}

/// Applies `subst` to `id`, rebuilding bottom-up into `pool`. Nodes with no
/// applicable substitution are re-allocated unchanged (the pool does not dedup
/// identical re-allocations, so callers that only need the original should check
/// for "no-op" substitutions themselves before calling).
pub fn substitute(pool: &mut ExprPool, id: ExprId, subst: &Substitution) -> ExprId {
    let mut memo = BTreeMap::new();
    substitute_rec(pool, id, subst, &mut memo)
}

fn substitute_rec(
    pool: &mut ExprPool,
    id: ExprId,
    subst: &Substitution,
    memo: &mut BTreeMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let node = pool.get(id).clone();
    let result = match node {
        Expr::Num(_) | Expr::CacheRead { .. } => id,

        Expr::Param(name) => match subst.params.get(&name) {
            Some(ParamSubst::Value(replacement)) => *replacement,
            _ => id,
        },

        Expr::Index { bundle, index, field } => {
            if let Some(key) = index_key(pool, &bundle, index, &field) {
                if let Some(&replacement) = subst.locals.get(&key) {
                    memo.insert(id, replacement);
                    return replacement;
                }
            }
            let new_index = substitute_rec(pool, index, subst, memo);
            let new_bundle = match subst.params.get(&bundle) {
                Some(ParamSubst::BundleAlias(target)) => target.clone(),
                _ => bundle,
            };
            pool.alloc(Expr::Index { bundle: new_bundle, index: new_index, field })
        },

        Expr::Binary { op, left, right } => {
            let l = substitute_rec(pool, left, subst, memo);
            let r = substitute_rec(pool, right, subst, memo);
            pool.alloc(Expr::Binary { op, left: l, right: r })
        },

        Expr::Unary { op, operand } => {
            let o = substitute_rec(pool, operand, subst, memo);
            pool.alloc(Expr::Unary { op, operand: o })
        },

        Expr::Call { spindle, args } => {
            let new_args = args.iter().map(|a| substitute_rec(pool, *a, subst, memo)).collect();
            pool.alloc(Expr::Call { spindle, args: new_args })
        },

        Expr::Extract { call, index } => {
            let c = substitute_rec(pool, call, subst, memo);
            pool.alloc(Expr::Extract { call: c, index })
        },

        Expr::Builtin { name, args } => {
            let new_args = args.iter().map(|a| substitute_rec(pool, *a, subst, memo)).collect();
            pool.alloc(Expr::Builtin { name, args: new_args })
        },

        Expr::Remap { base, substitutions } => {
            let new_base = substitute_rec(pool, base, subst, memo);
            let new_subs = substitutions
                .iter()
                .map(|(k, v)| (k.clone(), substitute_rec(pool, *v, subst, memo)))
                .collect();
            pool.alloc(Expr::Remap { base: new_base, substitutions: new_subs })
        },
    };
    memo.insert(id, result);
    result
}

/// Coordinate substitution (§4.D "applyRemap"): replaces `Index("me", _, Some(axis))`
/// anywhere it appears with `subs["me." + axis]`. A thin wrapper over [`substitute`]
/// with no param bindings, for callers that only have a coordinate map.
pub fn apply_remap(pool: &mut ExprPool, id: ExprId, subs: &BTreeMap<String, ExprId>) -> ExprId {
    let subst = Substitution { params: BTreeMap::new(), locals: subs.clone() };
    substitute(pool, id, &subst)
}
