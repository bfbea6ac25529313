//! Lowers a parsed surface AST into the `loom-ir` expression tree: registers
//! bundle/spindle shapes, resolves identifiers and chain patterns, expands ranges,
//! interns resources, and emits a topological declaration order.
//!
//! The lexer/parser that produces [`ast::Program`] is an external collaborator;
//! this crate only defines the tree it must build (§4.B "Surface AST").

pub mod ast;
mod chain;
mod errors;
mod lower;
mod scope;
mod topo;
mod width;

pub use errors::LoweringError;
pub use lower::lower;
pub use scope::{GlobalScope, LocalCtx, SpindleSig};
pub use width::{builtin_width, infer_width};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::*;

    fn num(n: f64) -> Expr {
        Expr::Num(n)
    }

    fn field(base: &str, name: &str) -> Expr {
        Expr::Field(Box::new(Expr::Ident(base.into())), name.into())
    }

    #[test]
    fn single_axis_gradient_end_to_end() {
        // display: r = me.x, g = me.y, b = 0  (§8 scenario 1)
        let ast = Program {
            bundles: vec![BundleDecl {
                name: "display".into(),
                tag: None,
                body: BundleBody::Strands(vec![
                    StrandDecl { name: Some("r".into()), expr: field("me", "x") },
                    StrandDecl { name: Some("g".into()), expr: field("me", "y") },
                    StrandDecl { name: Some("b".into()), expr: num(0.0) },
                ]),
            }],
            spindles: vec![],
        };

        let program = lower(&ast).unwrap();
        let display = program.bundle("display").unwrap();
        assert_eq!(display.width(), 3);
        assert_eq!(display.strand(0).unwrap().name, "r");
        assert_eq!(program.order.len(), 1);
        assert_eq!(program.order[0].bundle, "display");
    }

    #[test]
    fn chain_with_range_matches_scenario_five() {
        // a[x,y,z] = [1,2,3] -> { 0..3 * 2 }  =>  x=2, y=4, z=6  (§8 scenario 5)
        let block: PatternBlock = vec![Expr::Binary(
            BinaryOp::Mul,
            Box::new(Expr::Range(Some(0), Some(3))),
            Box::new(num(2.0)),
        )];
        let ast = Program {
            bundles: vec![BundleDecl {
                name: "a".into(),
                tag: None,
                body: BundleBody::Chain {
                    names: vec!["x".into(), "y".into(), "z".into()],
                    expr: Expr::Chain(
                        Box::new(Expr::BundleLiteral(vec![num(1.0), num(2.0), num(3.0)])),
                        vec![block],
                    ),
                },
            }],
            spindles: vec![],
        };

        let program = lower(&ast).unwrap();
        let a = program.bundle("a").unwrap().clone();
        assert_eq!(a.strands.iter().map(|s| s.name.clone()).collect::<Vec<_>>(), vec!["x", "y", "z"]);

        #[cfg(feature = "testing")]
        {
            use std::collections::BTreeMap as Map;
            let ctx = loom_ir::eval::EvalCtx::new(&program, Map::new());
            let values: Vec<f64> = a.strands.iter().map(|s| loom_ir::eval::eval(&ctx, s.expr)).collect();
            assert_eq!(values, vec![2.0, 4.0, 6.0]);
        }
    }

    #[test]
    fn unknown_bundle_reference_is_an_error() {
        let ast = Program {
            bundles: vec![BundleDecl {
                name: "display".into(),
                tag: None,
                body: BundleBody::Strands(vec![StrandDecl {
                    name: Some("r".into()),
                    expr: field("missing", "x"),
                }]),
            }],
            spindles: vec![],
        };
        assert!(matches!(lower(&ast), Err(LoweringError::UnknownBundle(_))));
    }

    #[test]
    fn spindle_call_in_single_value_context_extracts_return_zero() {
        let spindle = SpindleDecl {
            name: "double".into(),
            params: vec!["v".into()],
            locals: vec![],
            returns: vec![Expr::Binary(BinaryOp::Mul, Box::new(Expr::Ident("v".into())), Box::new(num(2.0)))],
        };
        let ast = Program {
            bundles: vec![BundleDecl {
                name: "out".into(),
                tag: None,
                body: BundleBody::Strands(vec![StrandDecl {
                    name: Some("v".into()),
                    expr: Expr::Call("double".into(), vec![num(21.0)]),
                }]),
            }],
            spindles: vec![spindle],
        };

        let program = lower(&ast).unwrap();
        let out = program.bundle("out").unwrap();
        assert!(matches!(program.pool.get(out.strand(0).unwrap().expr), loom_ir::Expr::Extract { index: 0, .. }));
    }

    #[test]
    fn duplicate_spindle_name_is_an_error() {
        let spindle = SpindleDecl { name: "f".into(), params: vec![], locals: vec![], returns: vec![num(1.0)] };
        let ast = Program { bundles: vec![], spindles: vec![spindle.clone(), spindle] };
        assert!(matches!(lower(&ast), Err(LoweringError::DuplicateSpindle(_))));
    }

    #[test]
    fn true_cycle_is_rejected() {
        let ast = Program {
            bundles: vec![
                BundleDecl {
                    name: "a".into(),
                    tag: None,
                    body: BundleBody::Strands(vec![StrandDecl { name: Some("v".into()), expr: field("b", "v") }]),
                },
                BundleDecl {
                    name: "b".into(),
                    tag: None,
                    body: BundleBody::Strands(vec![StrandDecl { name: Some("v".into()), expr: field("a", "v") }]),
                },
            ],
            spindles: vec![],
        };
        assert!(matches!(lower(&ast), Err(LoweringError::CircularDependency(_))));
    }
}
