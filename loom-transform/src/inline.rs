use std::collections::BTreeMap;

use loom_ir::{free_vars, Expr, ExprId, ExprPool, Spindle, StrandLocation};

use crate::substitute::{substitute, ParamSubst, Substitution};

/// Builds the substitution for one call of `spindle` with `args` (§4.D "build
/// spindle substitutions"): each parameter binds to its argument, and each local
/// bundle's strands bind under both their index and name forms to the local's
/// already-param-substituted right-hand side, so later locals (and the return
/// expressions) can reference earlier locals as if they were ordinary bundles.
pub fn build_spindle_substitution(pool: &mut ExprPool, spindle: &Spindle, args: &[ExprId]) -> Substitution {
    let mut subst = Substitution::default();
    for (name, arg) in spindle.params.iter().zip(args) {
        subst.params.insert(name.clone(), ParamSubst::Value(*arg));
    }
    for local in &spindle.locals {
        for strand in &local.strands {
            let rhs = substitute(pool, strand.expr, &subst);
            subst.locals.insert(format!("{}.{}", local.name, strand.index), rhs);
            subst.locals.insert(format!("{}.{}", local.name, strand.name), rhs);
        }
    }
    subst
}

/// Inlines one call of `spindle` (§4.D "inline a spindle call with a target"):
/// substitutes params and locals into `spindle.returns[return_index]`.
///
/// When `target` is given, any surviving self-reference to the returned local
/// inside the result — which, by the cycle-detection invariant in
/// [`crate::cycle::find_cyclic_caches`], can only legitimately occur inside a
/// cache's `value` argument — is rewritten to point at the caller's bundle/strand
/// instead. This is what gives each call site independent per-instance feedback
/// state rather than all calls aliasing one shared local.
pub fn inline_call(
    pool: &mut ExprPool,
    spindle: &Spindle,
    args: &[ExprId],
    return_index: usize,
    target: Option<&StrandLocation>,
) -> ExprId {
    let subst = build_spindle_substitution(pool, spindle, args);
    let result = substitute(pool, spindle.returns[return_index], &subst);

    match target {
        Some(target) => retarget_self_references(pool, spindle, result, target),
        None => result,
    }
}

/// Rewrites any remaining `Index(local_name, idx)` reference to one of `spindle`'s
/// own locals — unresolved only because it was a genuine self-reference at
/// substitution time — to `Index(target.bundle, target.strand_index)`.
fn retarget_self_references(pool: &mut ExprPool, spindle: &Spindle, id: ExprId, target: &StrandLocation) -> ExprId {
    let local_names: std::collections::BTreeSet<&str> =
        spindle.locals.iter().map(|l| l.name.as_str()).collect();
    let observed = free_vars(pool, id);
    if !local_names.iter().any(|name| observed.iter().any(|fv| fv.starts_with(format!("{name}.").as_str()))) {
        return id;
    }
    let mut memo = BTreeMap::new();
    retarget_rec(pool, id, &local_names, target, &mut memo)
}

fn retarget_rec(
    pool: &mut ExprPool,
    id: ExprId,
    local_names: &std::collections::BTreeSet<&str>,
    target: &StrandLocation,
    memo: &mut BTreeMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let node = pool.get(id).clone();
    let result = match node {
        Expr::Index { bundle, field, .. } if local_names.contains(bundle.as_str()) => {
            let retargeted_index = pool_alloc_num(pool, target.strand_index as f64);
            pool.alloc(Expr::Index { bundle: target.bundle.clone(), index: retargeted_index, field })
        },
        Expr::Index { bundle, index, field } => {
            let new_index = retarget_rec(pool, index, local_names, target, memo);
            pool.alloc(Expr::Index { bundle, index: new_index, field })
        },
        Expr::Binary { op, left, right } => {
            let l = retarget_rec(pool, left, local_names, target, memo);
            let r = retarget_rec(pool, right, local_names, target, memo);
            pool.alloc(Expr::Binary { op, left: l, right: r })
        },
        Expr::Unary { op, operand } => {
            let o = retarget_rec(pool, operand, local_names, target, memo);
            pool.alloc(Expr::Unary { op, operand: o })
        },
        Expr::Call { spindle, args } => {
            let new_args =
                args.iter().map(|a| retarget_rec(pool, *a, local_names, target, memo)).collect();
            pool.alloc(Expr::Call { spindle, args: new_args })
        },
        Expr::Extract { call, index } => {
            let c = retarget_rec(pool, call, local_names, target, memo);
            pool.alloc(Expr::Extract { call: c, index })
        },
        Expr::Builtin { name, args } => {
            let new_args =
                args.iter().map(|a| retarget_rec(pool, *a, local_names, target, memo)).collect();
            pool.alloc(Expr::Builtin { name, args: new_args })
        },
        Expr::Remap { base, substitutions } => {
            let new_base = retarget_rec(pool, base, local_names, target, memo);
            let new_subs = substitutions
                .iter()
                .map(|(k, v)| (k.clone(), retarget_rec(pool, *v, local_names, target, memo)))
                .collect();
            pool.alloc(Expr::Remap { base: new_base, substitutions: new_subs })
        },
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => id,
    };
    memo.insert(id, result);
    result
}

fn pool_alloc_num(pool: &mut ExprPool, n: f64) -> ExprId {
    pool.alloc(Expr::Num(n.into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{Bundle, BinaryOp, Program, Strand};

    #[test]
    fn inlines_pure_call_without_target() {
        let mut program = Program::new();
        let p = program.pool.alloc(Expr::Param("x".into()));
        let two = program.pool.alloc(Expr::Num(2.0.into()));
        let doubled = program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: p, right: two });
        let spindle = Spindle { name: "double".into(), params: vec!["x".into()], locals: vec![], returns: vec![doubled] };

        let arg = program.pool.alloc(Expr::Num(21.0.into()));
        let result = inline_call(&mut program.pool, &spindle, &[arg], 0, None);
        assert!(matches!(program.pool.get(result), Expr::Binary { .. }));
    }

    #[test]
    fn retargets_self_referential_cache_to_caller_strand() {
        let mut program = Program::new();
        let zero = program.pool.alloc(Expr::Num(0.0.into()));
        let self_ref = program.pool.alloc(Expr::Index { bundle: "counter".into(), index: zero, field: Some("v".into()) });
        let one = program.pool.alloc(Expr::Num(1.0.into()));
        let incremented = program.pool.alloc(Expr::Binary { op: BinaryOp::Add, left: self_ref, right: one });
        let h = program.pool.alloc(Expr::Num(2.0.into()));
        let t = program.pool.alloc(Expr::Num(0.0.into()));
        let sig = program.pool.alloc(Expr::Num(0.0.into()));
        let cache = program.pool.alloc(Expr::Builtin { name: "cache".into(), args: vec![incremented, h, t, sig] });

        let local = Bundle { name: "counter".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: cache }] };
        let ret = program.pool.alloc(Expr::Index { bundle: "counter".into(), index: zero, field: Some("v".into()) });
        let spindle = Spindle { name: "counter_fn".into(), params: vec![], locals: vec![local], returns: vec![ret] };

        let target = StrandLocation { bundle: "out".into(), strand_index: 3 };
        let result = inline_call(&mut program.pool, &spindle, &[], 0, Some(&target));

        let Expr::Builtin { args, .. } = program.pool.get(result) else { panic!("expected cache builtin") };
        let Expr::Index { bundle, .. } = program.pool.get(args[0]) else { panic!("expected retargeted index") };
        assert_eq!(bundle, "out");
    }
}
