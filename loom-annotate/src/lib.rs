//! Fixed-point annotation pass (§4.C): derives a [`SignalDescriptor`] for every
//! strand — which hardware it needs, how it constrains each coordinate axis, and
//! whether it is pure/stateful — by iterating a monotone lattice to a fixed point.
//!
//! Bundle-level purity is the AND of every member strand, not just the first: a
//! bundle with one impure strand among many pure ones is impure as a whole, since a
//! partition (`loom-partition`) that treats the bundle as a unit must account for
//! the worst strand it contains.

mod annotate;
mod descriptor;

pub use annotate::{annotate, direct_contributions, AnnotationResult};
pub use descriptor::SignalDescriptor;

#[cfg(test)]
mod tests {
    use super::*;
    use loom_ir::{Bundle, CoordAxis, Expr, ExprPool, HardwareToken, Program, Strand};

    #[test]
    fn microphone_forces_t_bound_on_its_strand() {
        let mut program = Program::new();
        let offset = program.pool.alloc(Expr::Num(0.0.into()));
        let channel = program.pool.alloc(Expr::Num(0.0.into()));
        let mic = program.pool.alloc(Expr::Builtin { name: "microphone".into(), args: vec![offset, channel] });
        program.bundles.insert(
            "listen".into(),
            Bundle { name: "listen".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: mic }] },
        );

        let result = annotate(&program);
        let desc = result.strand("listen", 0).unwrap();
        assert!(desc.hardware.contains(&HardwareToken::Microphone));
        assert_eq!(desc.coord_modes.get(&CoordAxis::T), Some(&loom_ir::AccessMode::Bound));
    }

    #[test]
    fn pure_arithmetic_strand_has_no_hardware() {
        let mut program = Program::new();
        let one = program.pool.alloc(Expr::Num(1.0.into()));
        let two = program.pool.alloc(Expr::Num(2.0.into()));
        let sum = program
            .pool
            .alloc(Expr::Binary { op: loom_ir::BinaryOp::Add, left: one, right: two });
        program.bundles.insert(
            "calc".into(),
            Bundle { name: "calc".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: sum }] },
        );

        let result = annotate(&program);
        let desc = result.strand("calc", 0).unwrap();
        assert!(desc.hardware.is_empty());
        assert!(desc.is_pure);
        assert!(!desc.stateful);
    }

    #[test]
    fn empty_program_annotates_to_nothing() {
        let program = Program::new();
        let result = annotate(&program);
        assert!(result.strands.is_empty());
        assert!(result.bundles.is_empty());
    }

    fn camera_strand(pool: &mut ExprPool) -> Expr {
        let u = pool.alloc(Expr::Num(0.0.into()));
        let v = pool.alloc(Expr::Num(0.0.into()));
        let ch = pool.alloc(Expr::Num(0.0.into()));
        Expr::Builtin { name: "camera".into(), args: vec![u, v, ch] }
    }

    #[test]
    fn rerunning_annotation_yields_identical_descriptors() {
        let mut program = Program::new();
        let cam = camera_strand(&mut program.pool);
        let id = program.pool.alloc(cam);
        program.bundles.insert(
            "src".into(),
            Bundle { name: "src".into(), strands: vec![Strand { name: "v".into(), index: 0, expr: id }] },
        );

        let first = annotate(&program);
        let second = annotate(&program);
        assert_eq!(first.strands, second.strands);
        assert_eq!(first.bundles, second.bundles);
    }
}
