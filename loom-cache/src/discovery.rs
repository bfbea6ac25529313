use std::collections::BTreeMap;

use loom_ir::{visit_children, Expr, ExprId, ExprPool, Program, Spindle, StrandLocation};
use loom_transform::inline_call;

/// Inlines every spindle call in every top-level bundle strand, mutating `program`
/// in place (§4.E "Discovery"). Caches declared inside a spindle body are only
/// visible to the rest of the pipeline once the call that reaches them has been
/// flattened away — each call site gets its own copy of the spindle's locals, which
/// is what gives per-instance feedback state to calls like `counter()` used twice.
pub fn inline_calls(program: &mut Program) {
    let spindles = program.spindles.clone();
    let bundle_names: Vec<String> = program.bundles.keys().cloned().collect();
    for bundle_name in bundle_names {
        let strand_count = program.bundles[&bundle_name].strands.len();
        for i in 0..strand_count {
            let target = StrandLocation { bundle: bundle_name.clone(), strand_index: i };
            let original = program.bundles[&bundle_name].strands[i].expr;
            let mut memo = BTreeMap::new();
            let inlined = inline_rec(&mut program.pool, &spindles, &target, original, &mut memo);
            program.bundles.get_mut(&bundle_name).unwrap().strands[i].expr = inlined;
        }
    }
}

fn inline_rec(
    pool: &mut ExprPool,
    spindles: &BTreeMap<String, Spindle>,
    target: &StrandLocation,
    id: ExprId,
    memo: &mut BTreeMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let node = pool.get(id).clone();
    let result = match node {
        Expr::Extract { call, index } => {
            if let Expr::Call { spindle, args } = pool.get(call).clone() {
                if let Some(def) = spindles.get(&spindle) {
                    let new_args: Vec<ExprId> =
                        args.iter().map(|a| inline_rec(pool, spindles, target, *a, memo)).collect();
                    inline_call(pool, def, &new_args, index, Some(target))
                } else {
                    let new_call = inline_rec(pool, spindles, target, call, memo);
                    pool.alloc(Expr::Extract { call: new_call, index })
                }
            } else {
                let new_call = inline_rec(pool, spindles, target, call, memo);
                pool.alloc(Expr::Extract { call: new_call, index })
            }
        },
        Expr::Call { spindle, args } => {
            let new_args: Vec<ExprId> =
                args.iter().map(|a| inline_rec(pool, spindles, target, *a, memo)).collect();
            if let Some(def) = spindles.get(&spindle) {
                inline_call(pool, def, &new_args, 0, Some(target))
            } else {
                pool.alloc(Expr::Call { spindle, args: new_args })
            }
        },
        Expr::Index { bundle, index, field } => {
            let new_index = inline_rec(pool, spindles, target, index, memo);
            pool.alloc(Expr::Index { bundle, index: new_index, field })
        },
        Expr::Binary { op, left, right } => {
            let l = inline_rec(pool, spindles, target, left, memo);
            let r = inline_rec(pool, spindles, target, right, memo);
            pool.alloc(Expr::Binary { op, left: l, right: r })
        },
        Expr::Unary { op, operand } => {
            let o = inline_rec(pool, spindles, target, operand, memo);
            pool.alloc(Expr::Unary { op, operand: o })
        },
        Expr::Builtin { name, args } => {
            let new_args: Vec<ExprId> =
                args.iter().map(|a| inline_rec(pool, spindles, target, *a, memo)).collect();
            pool.alloc(Expr::Builtin { name, args: new_args })
        },
        Expr::Remap { base, substitutions } => {
            let new_base = inline_rec(pool, spindles, target, base, memo);
            let new_subs = substitutions
                .iter()
                .map(|(k, v)| (k.clone(), inline_rec(pool, spindles, target, *v, memo)))
                .collect();
            pool.alloc(Expr::Remap { base: new_base, substitutions: new_subs })
        },
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => id,
    };
    memo.insert(id, result);
    result
}

/// One `cache(value, historySize, tapIndex, signal)` occurrence found at a strand,
/// before domain classification or self-reference detection.
#[derive(Debug, Clone)]
pub struct RawCache {
    pub location: StrandLocation,
    pub history_size: usize,
    pub tap_index: usize,
    pub value_expr: ExprId,
    pub signal_expr: ExprId,
}

fn collect_cache_calls(pool: &ExprPool, id: ExprId, out: &mut Vec<(usize, usize, ExprId, ExprId)>) {
    if let Expr::Builtin { name, args } = pool.get(id) {
        if name == "cache" && args.len() == 4 {
            if let (Expr::Num(h), Expr::Num(t)) = (pool.get(args[1]), pool.get(args[2])) {
                let (hv, tv) = (h.get(), t.get());
                if hv >= 1.0 && tv >= 0.0 {
                    out.push((hv as usize, tv as usize, args[0], args[3]));
                }
            }
        }
    }
    for child in visit_children(pool, id) {
        collect_cache_calls(pool, child, out);
    }
}

/// Walks every top-level bundle strand (after [`inline_calls`] has flattened spindle
/// bodies away) collecting every `cache(...)` occurrence with a literal history size
/// and tap index. Two occurrences on the same strand whose `value` and `signal`
/// expressions are structurally equal (§4.E "Deduplicate") collapse to one.
pub fn discover_raw(program: &Program) -> Vec<RawCache> {
    let mut result = Vec::new();
    for (bundle_name, bundle) in &program.bundles {
        for strand in &bundle.strands {
            let mut found = Vec::new();
            collect_cache_calls(&program.pool, strand.expr, &mut found);
            let mut kept: Vec<(usize, usize, ExprId, ExprId)> = Vec::new();
            for (h, t, value, signal) in found {
                let dup = kept.iter().any(|(_, _, v2, s2)| {
                    program.pool.structurally_eq(value, *v2, &program.pool)
                        && program.pool.structurally_eq(signal, *s2, &program.pool)
                });
                if !dup {
                    kept.push((h, t, value, signal));
                }
            }
            for (history_size, tap_index, value_expr, signal_expr) in kept {
                result.push(RawCache {
                    location: StrandLocation { bundle: bundle_name.clone(), strand_index: strand.index },
                    history_size,
                    tap_index,
                    value_expr,
                    signal_expr,
                });
            }
        }
    }
    result
}
