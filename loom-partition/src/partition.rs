use std::collections::{BTreeMap, BTreeSet, VecDeque};

use loom_annotate::{direct_contributions, AnnotationResult};
use loom_backend::BackendRegistry;
use loom_ir::{current_tick_free_vars, Program, StrandLocation};

use crate::error::PartitionError;
use crate::swatch::{CrossDomainSlot, Swatch};

/// A strand's owning backend is decided by the hardware it *directly* invokes, not
/// the hardware annotation's fully-propagated descriptor — the fixed point in
/// `loom-annotate` deliberately spreads a provider's hardware into every transitive
/// consumer (for purity classification), so using `AnnotationResult::strand` here
/// would misassign a pure consumer strand to its provider's backend just because it
/// reads a hardware-backed value.
fn owning_backend(program: &Program, registry: &BackendRegistry, location: &StrandLocation, proposed: &str) -> String {
    if let Some(strand) =
        program.bundles.get(&location.bundle).and_then(|b| b.strands.get(location.strand_index))
    {
        let direct = direct_contributions(&program.pool, strand.expr);
        for token in &direct.hardware {
            if let Some(spec) = registry.by_hardware(token) {
                return spec.identifier.clone();
            }
        }
    }
    proposed.to_string()
}

/// Resolves a `current_tick_free_vars` key to the strand location(s) it names. A
/// `"bundle.N"` key names exactly one strand; a bare bundle name (produced for a
/// dynamic index) conservatively depends on every strand of that bundle.
fn resolve_dep(program: &Program, key: &str) -> Vec<StrandLocation> {
    if let Some(pos) = key.rfind('.') {
        let (bundle, rest) = key.split_at(pos);
        let index_str = &rest[1..];
        if let Ok(index) = index_str.parse::<usize>() {
            if program.bundles.contains_key(bundle) {
                return vec![StrandLocation { bundle: bundle.to_string(), strand_index: index }];
            }
        }
    }
    match program.bundles.get(key) {
        Some(bundle) => bundle
            .strands
            .iter()
            .map(|s| StrandLocation { bundle: key.to_string(), strand_index: s.index })
            .collect(),
        None => Vec::new(),
    }
}

/// Partitions `program` into per-backend swatches (§4.F), starting a breadth-first
/// walk from every strand of a bundle the registry declares as a sink. A strand's
/// owning backend is the hardware backend it requires, if any, else the backend of
/// whichever consumer reaches it first — ties (a pure strand read by both domains)
/// are broken in favour of the first consumer, with every other consumer recording
/// a cross-domain input slot instead of duplicating the computation. This never
/// produces the `"none"`-tagged swatch the external interface reserves for
/// duplicated pure strands, since every reachable strand is assigned to exactly one
/// backend.
///
/// Operates on the cache-rewritten tree (after `loom-cache::build`), so a
/// self-referential cache's `value` argument already reads through `CacheRead`
/// (which has no free variables) rather than the strand itself — `current_tick_free_vars`
/// alone is therefore enough to build an acyclic dependency walk; no special-casing
/// for cache arguments is needed here the way it is in `loom-annotate`, which runs
/// before that rewrite.
pub fn partition(
    program: &Program,
    // Kept for API symmetry with the rest of the pipeline (and for a future
    // duplication strategy that would need `is_pure`); the assignment rule below
    // only needs each strand's direct hardware, not the propagated descriptor.
    _annotation: &AnnotationResult,
    registry: &BackendRegistry,
) -> Result<Vec<Swatch>, PartitionError> {
    let mut queue: VecDeque<(StrandLocation, String)> = VecDeque::new();
    for bundle in program.bundles.values() {
        if let Some(spec) = registry.by_sink(&bundle.name) {
            for strand in &bundle.strands {
                let location = StrandLocation { bundle: bundle.name.clone(), strand_index: strand.index };
                queue.push_back((location, spec.identifier.clone()));
            }
        }
    }
    if queue.is_empty() {
        return Err(PartitionError::NoSinkBundles);
    }

    let mut assigned: BTreeMap<StrandLocation, String> = BTreeMap::new();
    let mut consumers_of: BTreeMap<StrandLocation, BTreeSet<String>> = BTreeMap::new();
    let mut cross_edges: BTreeSet<StrandLocation> = BTreeSet::new();

    while let Some((location, consumer)) = queue.pop_front() {
        let owner = match assigned.get(&location) {
            Some(existing) => existing.clone(),
            None => {
                let owner = owning_backend(program, registry, &location, &consumer);
                assigned.insert(location.clone(), owner.clone());
                if let Some(strand) =
                    program.bundles.get(&location.bundle).and_then(|b| b.strands.get(location.strand_index))
                {
                    for key in current_tick_free_vars(&program.pool, strand.expr) {
                        for dep in resolve_dep(program, &key) {
                            queue.push_back((dep, owner.clone()));
                        }
                    }
                }
                owner
            },
        };
        if owner != consumer {
            cross_edges.insert(location.clone());
            consumers_of.entry(location.clone()).or_default().insert(consumer);
        }
    }

    let slot_index: BTreeMap<StrandLocation, usize> =
        cross_edges.into_iter().enumerate().map(|(i, loc)| (loc, i)).collect();

    let mut swatches: BTreeMap<String, Swatch> = BTreeMap::new();
    for (location, backend) in &assigned {
        let swatch = swatches.entry(backend.clone()).or_insert_with(|| Swatch {
            backend: Some(backend.clone()),
            ..Swatch::default()
        });
        swatch.bundles.insert(location.bundle.clone());
        swatch.strands.insert(location.clone());
    }
    for swatch in swatches.values_mut() {
        if let Some(spec) = swatch.backend.as_deref().and_then(|id| registry.by_identifier(id)) {
            swatch.is_sink = swatch.bundles.iter().any(|b| spec.bindings.sinks.contains(b));
        }
    }
    for (provider, consumers) in &consumers_of {
        let index = slot_index[provider];
        if let Some(owner) = assigned.get(provider) {
            if let Some(swatch) = swatches.get_mut(owner) {
                swatch.exports.push(CrossDomainSlot { location: provider.clone(), index });
            }
        }
        for consumer_backend in consumers {
            if let Some(swatch) = swatches.get_mut(consumer_backend) {
                swatch.inputs.push(CrossDomainSlot { location: provider.clone(), index });
            }
        }
    }
    for swatch in swatches.values_mut() {
        swatch.inputs.sort_by_key(|slot| slot.index);
        swatch.exports.sort_by_key(|slot| slot.index);
    }

    log::debug!(target: "loom::partition", "partitioned into {} swatch(es)", swatches.len());
    Ok(swatches.into_values().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_annotate::annotate;
    use loom_backend::{audio_backend_spec, visual_backend_spec, BackendRegistry};
    use loom_ir::{BinaryOp, Bundle, Expr, Strand};

    fn idx(pool: &mut loom_ir::ExprPool, bundle: &str, i: f64) -> loom_ir::ExprId {
        let index = pool.alloc(Expr::Num(i.into()));
        pool.alloc(Expr::Index { bundle: bundle.into(), index, field: None })
    }

    fn registry() -> BackendRegistry {
        // Constructed directly (not through the process-wide singleton) so each
        // test gets an isolated registry.
        BackendRegistry::new(vec![visual_backend_spec(), audio_backend_spec()])
    }

    #[test]
    fn partitions_pure_display_program_into_one_visual_swatch() {
        let mut program = Program::new();
        let r = program.pool.alloc(Expr::Num(1.0.into()));
        program.bundles.insert(
            "display".into(),
            Bundle { name: "display".into(), strands: vec![Strand { name: "r".into(), index: 0, expr: r }] },
        );
        let annotation = annotate(&program);
        let reg = registry();

        let swatches = partition(&program, &annotation, &reg).unwrap();
        assert_eq!(swatches.len(), 1);
        assert_eq!(swatches[0].backend.as_deref(), Some("visual"));
        assert!(swatches[0].is_sink);
    }

    #[test]
    fn cross_domain_reference_produces_input_slot() {
        let mut program = Program::new();
        let zero = program.pool.alloc(Expr::Num(0.0.into()));
        let offset = program.pool.alloc(Expr::Num(0.0.into()));
        let channel = program.pool.alloc(Expr::Num(0.0.into()));
        let mic = program.pool.alloc(Expr::Builtin { name: "microphone".into(), args: vec![offset, channel] });
        program.bundles.insert(
            "level".into(),
            Bundle { name: "level".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: mic }] },
        );
        let level_ref = idx(&mut program.pool, "level", 0.0);
        let half = program.pool.alloc(Expr::Num(0.5.into()));
        let brightness =
            program.pool.alloc(Expr::Binary { op: BinaryOp::Mul, left: level_ref, right: half });
        program.bundles.insert(
            "display".into(),
            Bundle {
                name: "display".into(),
                strands: vec![Strand { name: "r".into(), index: 0, expr: brightness }],
            },
        );

        let annotation = annotate(&program);
        let reg = registry();
        let swatches = partition(&program, &annotation, &reg).unwrap();

        let visual = swatches.iter().find(|s| s.backend.as_deref() == Some("visual")).unwrap();
        let audio = swatches.iter().find(|s| s.backend.as_deref() == Some("audio")).unwrap();
        assert!(audio.strands.contains(&StrandLocation { bundle: "level".into(), strand_index: 0 }));
        assert_eq!(visual.inputs.len(), 1);
        assert_eq!(visual.inputs[0].location.bundle, "level");
        assert_eq!(audio.exports.len(), 1);
        assert_eq!(audio.exports[0].index, visual.inputs[0].index);
    }

    #[test]
    fn no_declared_sinks_is_an_error() {
        let program = Program::new();
        let annotation = annotate(&program);
        let reg = registry();
        assert_eq!(partition(&program, &annotation, &reg), Err(PartitionError::NoSinkBundles));
    }
}
