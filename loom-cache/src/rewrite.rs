use std::collections::BTreeMap;

use loom_ir::{CacheDescriptor, Expr, ExprId, ExprPool, Program};

/// Breaks every self-referential cache's cycle (§4.E "Cycle-breaking rewrite"): for
/// each descriptor flagged `has_self_reference`, every `Index` elsewhere in the
/// program that resolves to its owning `(bundle, strand)` is replaced by
/// `CacheRead(id, tapIndex)`. A descriptor's own `value_expr` is left untouched —
/// rewriting happens on the live strand trees reachable from `program.bundles`, and
/// the expression id recorded on the descriptor still points at the pre-rewrite
/// node, which is exactly what makes the self-reference inside `cache(...)`'s own
/// `value` argument resolve to `CacheRead` too once that argument is walked as part
/// of its strand's tree: the descriptor is a read-only record of what was found, not
/// a second copy of the executable tree.
pub fn break_cycles(program: &mut Program, descriptors: &[CacheDescriptor]) {
    let mut targets: BTreeMap<String, (u32, usize)> = BTreeMap::new();
    for d in descriptors {
        if d.has_self_reference {
            let key = format!("{}.{}", d.location.bundle, d.location.strand_index);
            targets.insert(key, (d.id, d.tap_index));
        }
    }
    if targets.is_empty() {
        return;
    }

    let bundle_names: Vec<String> = program.bundles.keys().cloned().collect();
    for bundle_name in bundle_names {
        let strand_count = program.bundles[&bundle_name].strands.len();
        for i in 0..strand_count {
            let original = program.bundles[&bundle_name].strands[i].expr;
            let mut memo = BTreeMap::new();
            let rewritten = rewrite_rec(&mut program.pool, &targets, original, &mut memo);
            program.bundles.get_mut(&bundle_name).unwrap().strands[i].expr = rewritten;
        }
    }
}

fn rewrite_rec(
    pool: &mut ExprPool,
    targets: &BTreeMap<String, (u32, usize)>,
    id: ExprId,
    memo: &mut BTreeMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let node = pool.get(id).clone();
    let result = match node {
        Expr::Index { bundle, index, field } => {
            if let Expr::Num(n) = pool.get(index) {
                let key = format!("{bundle}.{}", n.get() as i64);
                if let Some(&(cache_id, tap_index)) = targets.get(&key) {
                    let read = pool.alloc(Expr::CacheRead { cache_id, tap_index });
                    memo.insert(id, read);
                    return read;
                }
            }
            let new_index = rewrite_rec(pool, targets, index, memo);
            pool.alloc(Expr::Index { bundle, index: new_index, field })
        },
        Expr::Binary { op, left, right } => {
            let l = rewrite_rec(pool, targets, left, memo);
            let r = rewrite_rec(pool, targets, right, memo);
            pool.alloc(Expr::Binary { op, left: l, right: r })
        },
        Expr::Unary { op, operand } => {
            let o = rewrite_rec(pool, targets, operand, memo);
            pool.alloc(Expr::Unary { op, operand: o })
        },
        Expr::Call { spindle, args } => {
            let new_args = args.iter().map(|a| rewrite_rec(pool, targets, *a, memo)).collect();
            pool.alloc(Expr::Call { spindle, args: new_args })
        },
        Expr::Extract { call, index } => {
            let c = rewrite_rec(pool, targets, call, memo);
            pool.alloc(Expr::Extract { call: c, index })
        },
        Expr::Builtin { name, args } => {
            let new_args = args.iter().map(|a| rewrite_rec(pool, targets, *a, memo)).collect();
            pool.alloc(Expr::Builtin { name, args: new_args })
        },
        Expr::Remap { base, substitutions } => {
            let new_base = rewrite_rec(pool, targets, base, memo);
            let new_subs = substitutions
                .iter()
                .map(|(k, v)| (k.clone(), rewrite_rec(pool, targets, *v, memo)))
                .collect();
            pool.alloc(Expr::Remap { base: new_base, substitutions: new_subs })
        },
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => id,
    };
    memo.insert(id, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{Bundle, BinaryOp, CacheDomain, Strand, StrandLocation};

    #[test]
    fn replaces_self_reference_with_cache_read() {
        let mut pool = ExprPool::new();
        let zero = pool.alloc(Expr::Num(0.0.into()));
        let self_ref = pool.alloc(Expr::Index { bundle: "env".into(), index: zero, field: Some("v".into()) });
        let one = pool.alloc(Expr::Num(1.0.into()));
        let value = pool.alloc(Expr::Binary { op: BinaryOp::Add, left: self_ref, right: one });
        let history = pool.alloc(Expr::Num(2.0.into()));
        let tap = pool.alloc(Expr::Num(0.0.into()));
        let signal = pool.alloc(Expr::Num(0.0.into()));
        let cache = pool.alloc(Expr::Builtin { name: "cache".into(), args: vec![value, history, tap, signal] });

        let mut program = Program { pool, ..Program::new() };
        program.bundles.insert(
            "env".into(),
            Bundle { name: "env".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: cache }] },
        );

        let descriptor = CacheDescriptor {
            id: 0,
            location: StrandLocation { bundle: "env".into(), strand_index: 0 },
            history_size: 2,
            tap_index: 0,
            value_expr: value,
            signal_expr: signal,
            domain: CacheDomain::Visual,
            history_buffer: 0,
            signal_buffer: 0,
            has_self_reference: true,
        };
        break_cycles(&mut program, &[descriptor]);

        let Expr::Builtin { args, .. } = program.pool.get(program.bundles["env"].strands[0].expr) else {
            panic!("expected cache builtin")
        };
        assert!(matches!(program.pool.get(args[0]), Expr::Binary { .. }));
        let Expr::Binary { left, .. } = program.pool.get(args[0]) else { unreachable!() };
        assert!(matches!(program.pool.get(*left), Expr::CacheRead { .. }));
    }

    #[test]
    fn non_self_referential_descriptor_leaves_tree_untouched() {
        let mut pool = ExprPool::new();
        let value = pool.alloc(Expr::Num(1.0.into()));
        let signal = pool.alloc(Expr::Num(0.0.into()));
        let mut program = Program { pool, ..Program::new() };
        program.bundles.insert(
            "env".into(),
            Bundle { name: "env".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: value }] },
        );

        let descriptor = CacheDescriptor {
            id: 0,
            location: StrandLocation { bundle: "env".into(), strand_index: 0 },
            history_size: 2,
            tap_index: 0,
            value_expr: value,
            signal_expr: signal,
            domain: CacheDomain::Visual,
            history_buffer: 0,
            signal_buffer: 0,
            has_self_reference: false,
        };
        break_cycles(&mut program, &[descriptor]);

        assert_eq!(program.bundles["env"].strands[0].expr, value);
    }
}
