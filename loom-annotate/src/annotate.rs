use std::collections::BTreeMap;

use loom_ir::{
    is_temporal_remap, primitive_spec, visit_children, Expr, ExprId, ExprPool, Program,
    StrandLocation,
};

use crate::descriptor::SignalDescriptor;

/// Result of the annotation pass: a descriptor per strand and a derived descriptor
/// per bundle.
#[derive(Debug, Clone, Default)]
pub struct AnnotationResult {
    pub strands: BTreeMap<StrandLocation, SignalDescriptor>,
    pub bundles: BTreeMap<String, SignalDescriptor>,
}

impl AnnotationResult {
    pub fn strand(&self, bundle: &str, index: usize) -> Option<&SignalDescriptor> {
        self.strands.get(&StrandLocation { bundle: bundle.into(), strand_index: index })
    }

    pub fn bundle(&self, name: &str) -> Option<&SignalDescriptor> {
        self.bundles.get(name)
    }
}

/// A dependency of one strand on another: either a specific strand, or (for a
/// dynamic index) an entire bundle.
enum Dep {
    Strand(StrandLocation),
    Bundle(String),
}

/// Collects the strands/bundles one expression depends on *this tick*, per §4.C:
/// a strand's own self-reference (however deep inside a `cache`'s `value` argument)
/// does not count, since it resolves through history rather than the current
/// evaluation — mirroring the same exemption used for bundle declaration ordering.
/// Every other dependency inside `value`, including a *different* strand's hardware
/// read via `Index`, counts exactly like it would anywhere else in the tree; only
/// the self-reference itself is tick-exempt, not the whole subtree around it.
fn collect_deps(pool: &ExprPool, id: ExprId, self_loc: &StrandLocation, out: &mut Vec<Dep>) {
    match pool.get(id) {
        Expr::Index { bundle, index, .. } => match pool.get(*index) {
            Expr::Num(n) => {
                let strand_index = n.get() as usize;
                if bundle == &self_loc.bundle && strand_index == self_loc.strand_index {
                    // Self-reference: resolves through cache history, not this tick.
                } else {
                    out.push(Dep::Strand(StrandLocation { bundle: bundle.clone(), strand_index }));
                }
            },
            _ => {
                out.push(Dep::Bundle(bundle.clone()));
                collect_deps(pool, *index, self_loc, out);
            },
        },
        Expr::Builtin { name, args } if name == "cache" => {
            for a in args {
                collect_deps(pool, *a, self_loc, out);
            }
        },
        Expr::Remap { base, substitutions } => {
            if is_temporal_remap(pool, *base, substitutions) {
                for v in substitutions.values() {
                    collect_deps(pool, *v, self_loc, out);
                }
            } else {
                collect_deps(pool, *base, self_loc, out);
                for v in substitutions.values() {
                    collect_deps(pool, *v, self_loc, out);
                }
            }
        },
        _ => {
            for child in visit_children(pool, id) {
                collect_deps(pool, child, self_loc, out);
            }
        },
    }
}

/// Direct contributions from every built-in invoked anywhere in the expression
/// (unlike [`collect_deps`], this walk is NOT tick-exempt: a cache's `value`
/// argument genuinely is evaluated to decide what to store, so its built-ins still
/// contribute hardware/statefulness/coordinate constraints here).
///
/// This is the *local* descriptor, before the fixed point propagates a provider's
/// hardware into every transitive consumer — `loom-partition` needs exactly this,
/// not [`AnnotationResult::strand`], to tell which strand actually owns a backend
/// versus which one merely reads a value that happens to flow from one.
pub fn direct_contributions(pool: &ExprPool, id: ExprId) -> SignalDescriptor {
    let mut desc = SignalDescriptor::pure_leaf();
    walk_contributions(pool, id, &mut desc);
    desc
}

fn walk_contributions(pool: &ExprPool, id: ExprId, desc: &mut SignalDescriptor) {
    if let Expr::Builtin { name, .. } = pool.get(id) {
        if let Some(spec) = primitive_spec(name) {
            if spec.stateful {
                desc.stateful = true;
            }
            if !spec.hardware.is_empty() {
                desc.is_pure = false;
            }
            desc.hardware.extend(spec.hardware.iter().cloned());
            for (axis, mode) in spec.coord_overrides {
                desc.force_mode(*axis, *mode);
            }
        }
    }
    if matches!(pool.get(id), Expr::CacheRead { .. }) {
        desc.stateful = true;
    }
    for child in visit_children(pool, id) {
        walk_contributions(pool, child, desc);
    }
}

/// Runs the fixed-point annotation pass over every strand in `program` (§4.C).
pub fn annotate(program: &Program) -> AnnotationResult {
    let mut descriptors: BTreeMap<StrandLocation, SignalDescriptor> = BTreeMap::new();
    let mut deps: BTreeMap<StrandLocation, Vec<Dep>> = BTreeMap::new();

    for (bundle_name, bundle) in &program.bundles {
        for strand in &bundle.strands {
            let location = StrandLocation { bundle: bundle_name.clone(), strand_index: strand.index };
            descriptors.insert(location.clone(), direct_contributions(&program.pool, strand.expr));
            let mut d = Vec::new();
            collect_deps(&program.pool, strand.expr, &location, &mut d);
            deps.insert(location, d);
        }
    }

    let strand_count = descriptors.len();
    for _ in 0..=strand_count {
        let mut changed = false;
        let snapshot = descriptors.clone();
        for (location, own_deps) in &deps {
            let mut merged = snapshot[location].clone();
            for dep in own_deps {
                match dep {
                    Dep::Strand(loc) => {
                        if let Some(other) = snapshot.get(loc) {
                            merged.merge_from(other);
                        }
                    },
                    Dep::Bundle(bundle_name) => {
                        if let Some(bundle) = program.bundles.get(bundle_name) {
                            for strand in &bundle.strands {
                                let loc = StrandLocation {
                                    bundle: bundle_name.clone(),
                                    strand_index: strand.index,
                                };
                                if let Some(other) = snapshot.get(&loc) {
                                    merged.merge_from(other);
                                }
                            }
                        }
                    },
                }
            }
            if merged != snapshot[location] {
                changed = true;
                descriptors.insert(location.clone(), merged);
            }
        }
        if !changed {
            log::trace!(target: "loom::annotate", "fixed point reached");
            break;
        }
    }

    let mut bundles = BTreeMap::new();
    for (bundle_name, bundle) in &program.bundles {
        let mut bundle_desc = SignalDescriptor::pure_leaf();
        let mut all_pure = true;
        for strand in &bundle.strands {
            let location = StrandLocation { bundle: bundle_name.clone(), strand_index: strand.index };
            if let Some(desc) = descriptors.get(&location) {
                bundle_desc.hardware.extend(desc.hardware.iter().cloned());
                bundle_desc.stateful |= desc.stateful;
                all_pure &= desc.is_pure;
                for (axis, mode) in &desc.coord_modes {
                    bundle_desc.force_mode(*axis, *mode);
                }
            }
        }
        bundle_desc.is_pure = all_pure;
        bundles.insert(bundle_name.clone(), bundle_desc);
    }

    AnnotationResult { strands: descriptors, bundles }
}
