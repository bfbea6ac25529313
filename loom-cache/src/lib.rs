//! The feedback-history cache manager (§4.E): discovers every `cache(...)` call in a
//! lowered program (inlining spindle calls first, so instance-local caches surface
//! at their call site), classifies each by execution domain, rewrites
//! self-referential reads into `CacheRead` nodes, and owns the ring buffers that
//! back them at runtime.

mod discovery;
mod domain;
mod manager;
mod rewrite;

pub use discovery::{discover_raw, inline_calls, RawCache};
pub use domain::{build_descriptors, AUDIO_HARDWARE};
pub use manager::CacheManager;
pub use rewrite::break_cycles;

use loom_annotate::AnnotationResult;
use loom_ir::Program;

/// Runs the full cache-manager pipeline over an already-lowered, already-annotated
/// program: inline, discover, classify, break cycles, and return a `CacheManager`
/// with its descriptor table populated (buffers are not yet allocated — call
/// [`CacheManager::allocate`] once output dimensions are known).
///
/// Mutates `program` in place: spindle calls are inlined away and self-referential
/// reads become `CacheRead` nodes, so `program` after this call is what the
/// partitioner and backends should see, not the tree lowering originally produced.
pub fn build(program: &mut Program, annotation: &AnnotationResult) -> CacheManager {
    inline_calls(program);
    let raws = discover_raw(program);
    log::debug!(target: "loom::cache", "discovered {} cache occurrence(s)", raws.len());
    let descriptors = build_descriptors(program, annotation, raws);
    break_cycles(program, &descriptors);
    CacheManager::new(descriptors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loom_annotate::annotate;
    use loom_ir::{BinaryOp, Bundle, CacheDomain, Expr, Strand};

    /// `counter.v = cache(counter.v + 1, 4, 0, signal.v)` — a directly self-
    /// referential visual-domain counter with no spindle involved.
    fn counter_program() -> Program {
        let mut program = Program::new();
        let zero = program.pool.alloc(Expr::Num(0.0.into()));
        let self_ref =
            program.pool.alloc(Expr::Index { bundle: "counter".into(), index: zero, field: Some("v".into()) });
        let one = program.pool.alloc(Expr::Num(1.0.into()));
        let incremented = program.pool.alloc(Expr::Binary { op: BinaryOp::Add, left: self_ref, right: one });
        let history = program.pool.alloc(Expr::Num(4.0.into()));
        let tap = program.pool.alloc(Expr::Num(0.0.into()));
        let sig_zero = program.pool.alloc(Expr::Num(0.0.into()));
        let signal_ref =
            program.pool.alloc(Expr::Index { bundle: "signal".into(), index: sig_zero, field: Some("v".into()) });
        let cache = program.pool.alloc(Expr::Builtin {
            name: "cache".into(),
            args: vec![incremented, history, tap, signal_ref],
        });
        program.bundles.insert(
            "counter".into(),
            Bundle { name: "counter".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: cache }] },
        );
        program.bundles.insert(
            "signal".into(),
            Bundle { name: "signal".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: sig_zero }] },
        );
        program
    }

    #[test]
    fn full_pipeline_discovers_and_breaks_self_referential_counter() {
        let mut program = counter_program();
        let annotation = annotate(&program);

        let manager = build(&mut program, &annotation);
        assert_eq!(manager.descriptors().len(), 1);
        assert!(manager.descriptors()[0].has_self_reference);
        assert_eq!(manager.descriptors()[0].domain, CacheDomain::Visual);

        let rewritten = program.bundles["counter"].strands[0].expr;
        let Expr::Builtin { args, .. } = program.pool.get(rewritten) else { panic!("expected cache builtin") };
        let Expr::Binary { left, .. } = program.pool.get(args[0]) else { panic!("expected binary add") };
        assert!(matches!(program.pool.get(*left), Expr::CacheRead { .. }));
    }

    #[test]
    fn full_pipeline_then_ticking_counter_increments_each_signal_change() {
        let mut program = counter_program();
        let annotation = annotate(&program);
        let mut manager = build(&mut program, &annotation);
        manager.allocate(1, 1); // single-pixel visual output

        let cache_id = manager.descriptors()[0].id;
        // tap_index 0 reads back the sample just written this tick, so feeding
        // `stored + 1` through each tick reproduces the counter's intended growth.
        let mut stored = 0.0;
        for signal in [1.0, 2.0, 3.0] {
            stored = manager.tick_visual(cache_id, 0, 0, 1, stored + 1.0, signal);
        }
        assert_eq!(stored, 3.0);
    }

    #[test]
    fn empty_program_discovers_nothing() {
        let mut program = Program::new();
        let annotation = annotate(&program);
        let manager = build(&mut program, &annotation);
        assert!(manager.descriptors().is_empty());
    }
}
