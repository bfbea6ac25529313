use loom_ir::{collect_bundle_references, free_vars, visit_children, Expr, ExprId, ExprPool, Spindle};

/// A `(bundle, strand)` pair within a spindle's local scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalRef {
    pub bundle: String,
    pub strand: usize,
}

fn collect_cache_values(pool: &ExprPool, id: ExprId, out: &mut Vec<ExprId>) {
    if let Expr::Builtin { name, args } = pool.get(id) {
        if name == "cache" {
            out.push(args[0]);
        }
    }
    for child in visit_children(pool, id) {
        collect_cache_values(pool, child, out);
    }
}

/// Finds every `(cache-location, cyclic-local)` pair in `spindle` (§4.D "cycle
/// detection in spindles"): a cache whose `value` expression references some local
/// `L`, where `L` (directly or transitively) references the cache's own owning
/// local/strand back. These are exactly the caches [`crate::inline::inline_call`]
/// must retarget at each call site, since without retargeting every call would
/// alias the same feedback state.
pub fn find_cyclic_caches(pool: &ExprPool, spindle: &Spindle) -> Vec<(LocalRef, LocalRef)> {
    let mut pairs = Vec::new();
    for local in &spindle.locals {
        for strand in &local.strands {
            let mut cache_values = Vec::new();
            collect_cache_values(pool, strand.expr, &mut cache_values);
            for value in cache_values {
                let referenced = collect_bundle_references(pool, value, false);
                for other_name in &referenced {
                    let Some(other_local) = spindle.locals.iter().find(|l| &l.name == other_name) else {
                        continue;
                    };
                    for other_strand in &other_local.strands {
                        let back_refs = free_vars(pool, other_strand.expr);
                        let by_index = format!("{}.{}", local.name, strand.index);
                        let by_name = format!("{}.{}", local.name, strand.name);
                        if back_refs.contains(&by_index) || back_refs.contains(&by_name) {
                            pairs.push((
                                LocalRef { bundle: local.name.clone(), strand: strand.index },
                                LocalRef { bundle: other_local.name.clone(), strand: other_strand.index },
                            ));
                        }
                    }
                }
            }
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{Bundle, BinaryOp, Strand};

    #[test]
    fn detects_self_referential_cache_local() {
        let mut pool = ExprPool::new();
        let zero = pool.alloc(Expr::Num(0.0.into()));
        let self_ref = pool.alloc(Expr::Index { bundle: "counter".into(), index: zero, field: Some("v".into()) });
        let one = pool.alloc(Expr::Num(1.0.into()));
        let incremented = pool.alloc(Expr::Binary { op: BinaryOp::Add, left: self_ref, right: one });
        let h = pool.alloc(Expr::Num(2.0.into()));
        let t = pool.alloc(Expr::Num(0.0.into()));
        let sig = pool.alloc(Expr::Num(0.0.into()));
        let cache = pool.alloc(Expr::Builtin { name: "cache".into(), args: vec![incremented, h, t, sig] });

        let local = Bundle { name: "counter".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: cache }] };
        let ret = pool.alloc(Expr::Num(0.0.into()));
        let spindle = Spindle { name: "counter_fn".into(), params: vec![], locals: vec![local], returns: vec![ret] };

        let pairs = find_cyclic_caches(&pool, &spindle);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, LocalRef { bundle: "counter".into(), strand: 0 });
        assert_eq!(pairs[0].1, LocalRef { bundle: "counter".into(), strand: 0 });
    }

    #[test]
    fn no_cache_means_no_cyclic_pairs() {
        let mut pool = ExprPool::new();
        let v = pool.alloc(Expr::Num(1.0.into()));
        let local = Bundle { name: "plain".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: v }] };
        let ret = pool.alloc(Expr::Num(0.0.into()));
        let spindle = Spindle { name: "f".into(), params: vec![], locals: vec![local], returns: vec![ret] };
        assert!(find_cyclic_caches(&pool, &spindle).is_empty());
    }
}
