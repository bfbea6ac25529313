use loom_annotate::AnnotationResult;
use loom_ir::{free_vars, CacheDescriptor, CacheDomain, HardwareToken, Program};

use crate::discovery::RawCache;

/// Hardware tokens the audio backend owns (§4.E "Domain classification": "if [the
/// owning bundle's hardware] intersects the audio backend's owned hardware, the
/// cache is audio; otherwise visual"). `Speaker` never appears in
/// `loom_ir::primitive_spec`'s table — no built-in *reads* a speaker, only an
/// audio-domain backend writes to one — but it is still the audio backend's to own,
/// so it is listed here rather than left for a future backend-registry lookup.
pub const AUDIO_HARDWARE: &[HardwareToken] = &[HardwareToken::Microphone, HardwareToken::Speaker];

fn classify(annotation: &AnnotationResult, bundle: &str) -> CacheDomain {
    let hardware = annotation.bundle(bundle).map(|d| &d.hardware);
    let is_audio = hardware.is_some_and(|h| h.iter().any(|t| AUDIO_HARDWARE.contains(t)));
    if is_audio {
        CacheDomain::Audio
    } else {
        CacheDomain::Visual
    }
}

/// A cache is self-referential iff its `value` expression observes the strand it is
/// itself assigned to. `loom-lower` always resolves a field-name `Index` to a
/// literal numeric index alongside the name, so `free_vars`'s `"bundle.N"` keying
/// already covers both access forms — there is no separate field-name case to check.
fn has_self_reference(program: &Program, raw: &RawCache) -> bool {
    let key = format!("{}.{}", raw.location.bundle, raw.location.strand_index);
    free_vars(&program.pool, raw.value_expr).contains(&key)
}

/// Promotes discovered cache occurrences to full descriptors: assigns a stable id,
/// classifies the execution domain from the owning bundle's annotated hardware, and
/// flags self-reference. Buffer indices are left at `0`; [`crate::CacheManager::allocate`]
/// fills them in once output dimensions are known.
pub fn build_descriptors(
    program: &Program,
    annotation: &AnnotationResult,
    raws: Vec<RawCache>,
) -> Vec<CacheDescriptor> {
    raws.into_iter()
        .enumerate()
        .map(|(i, raw)| {
            let domain = classify(annotation, &raw.location.bundle);
            let has_self_reference = has_self_reference(program, &raw);
            CacheDescriptor {
                id: i as u32,
                location: raw.location,
                history_size: raw.history_size,
                tap_index: raw.tap_index,
                value_expr: raw.value_expr,
                signal_expr: raw.signal_expr,
                domain,
                history_buffer: 0,
                signal_buffer: 0,
                has_self_reference,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_annotate::SignalDescriptor;
    use loom_ir::{Expr, ExprPool, StrandLocation};
    use std::collections::BTreeMap as Map;

    fn annotation_with(bundle: &str, hardware: &[HardwareToken]) -> AnnotationResult {
        let mut bundles = Map::new();
        let mut desc = SignalDescriptor::pure_leaf();
        desc.hardware.extend(hardware.iter().cloned());
        bundles.insert(bundle.to_string(), desc);
        AnnotationResult { strands: Map::new(), bundles }
    }

    #[test]
    fn microphone_bundle_classifies_as_audio() {
        let mut pool = ExprPool::new();
        let value = pool.alloc(Expr::Num(1.0.into()));
        let signal = pool.alloc(Expr::Num(0.0.into()));
        let raw = RawCache {
            location: StrandLocation { bundle: "mic_env".into(), strand_index: 0 },
            history_size: 2,
            tap_index: 0,
            value_expr: value,
            signal_expr: signal,
        };
        let program = Program { pool, ..Program::new() };
        let annotation = annotation_with("mic_env", &[HardwareToken::Microphone]);

        let descriptors = build_descriptors(&program, &annotation, vec![raw]);
        assert_eq!(descriptors[0].domain, CacheDomain::Audio);
    }

    #[test]
    fn camera_bundle_classifies_as_visual() {
        let mut pool = ExprPool::new();
        let value = pool.alloc(Expr::Num(1.0.into()));
        let signal = pool.alloc(Expr::Num(0.0.into()));
        let raw = RawCache {
            location: StrandLocation { bundle: "cam_env".into(), strand_index: 0 },
            history_size: 2,
            tap_index: 0,
            value_expr: value,
            signal_expr: signal,
        };
        let program = Program { pool, ..Program::new() };
        let annotation = annotation_with("cam_env", &[HardwareToken::Camera]);

        let descriptors = build_descriptors(&program, &annotation, vec![raw]);
        assert_eq!(descriptors[0].domain, CacheDomain::Visual);
    }

    #[test]
    fn detects_self_reference_by_numeric_key() {
        let mut pool = ExprPool::new();
        let zero = pool.alloc(Expr::Num(0.0.into()));
        let self_ref = pool.alloc(Expr::Index { bundle: "env".into(), index: zero, field: Some("v".into()) });
        let one = pool.alloc(Expr::Num(1.0.into()));
        let value = pool.alloc(Expr::Binary { op: loom_ir::BinaryOp::Add, left: self_ref, right: one });
        let signal = pool.alloc(Expr::Num(0.0.into()));
        let raw = RawCache {
            location: StrandLocation { bundle: "env".into(), strand_index: 0 },
            history_size: 2,
            tap_index: 0,
            value_expr: value,
            signal_expr: signal,
        };
        let program = Program { pool, ..Program::new() };
        let annotation = annotation_with("env", &[]);

        let descriptors = build_descriptors(&program, &annotation, vec![raw]);
        assert!(descriptors[0].has_self_reference);
    }
}
