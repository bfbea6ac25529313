//! Topological ordering of bundle declarations (§4.B "Topological ordering"). A
//! cache's `value` argument is exempt from the dependency graph — the whole point
//! of `cache` is to let a bundle depend on its own previous-tick value without
//! that counting as a same-tick cycle (§3 "the dependency graph ... is acyclic
//! except where broken by cache").

use std::collections::{BTreeMap, BTreeSet};

use loom_ir::{is_temporal_remap, visit_children, Expr, ExprId, ExprPool, Program};

use crate::errors::LoweringError;

fn collect_order_deps(pool: &ExprPool, id: ExprId, out: &mut BTreeSet<String>) {
    match pool.get(id) {
        Expr::Index { bundle, index, .. } => {
            out.insert(bundle.clone());
            collect_order_deps(pool, *index, out);
        },
        Expr::Builtin { name, args } if name == "cache" => {
            // args[0] is the value expression; it may legitimately reference this
            // same location (resolved next tick) and must not count as a cycle.
            for a in args.iter().skip(1) {
                collect_order_deps(pool, *a, out);
            }
        },
        Expr::Remap { base, substitutions } => {
            if is_temporal_remap(pool, *base, substitutions) {
                for v in substitutions.values() {
                    collect_order_deps(pool, *v, out);
                }
            } else {
                collect_order_deps(pool, *base, out);
                for v in substitutions.values() {
                    collect_order_deps(pool, *v, out);
                }
            }
        },
        _ => {
            for child in visit_children(pool, id) {
                collect_order_deps(pool, child, out);
            }
        },
    }
}

/// Dependency set of one bundle, unioned over all its strands, excluding `me` and
/// self-references.
fn bundle_dependencies(program: &Program, bundle_name: &str) -> BTreeSet<String> {
    let bundle = &program.bundles[bundle_name];
    let mut deps = BTreeSet::new();
    for strand in &bundle.strands {
        collect_order_deps(&program.pool, strand.expr, &mut deps);
    }
    deps.remove("me");
    deps.remove(bundle_name);
    deps
}

/// Computes a topological order of `program`'s bundles. Depth-first with an
/// in-progress marker so the first real cycle found is reported with its full
/// path.
pub fn topological_order(program: &Program) -> Result<Vec<String>, LoweringError> {
    let deps: BTreeMap<String, BTreeSet<String>> =
        program.bundles.keys().map(|name| (name.clone(), bundle_dependencies(program, name))).collect();

    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InProgress,
        Done,
    }

    let mut marks: BTreeMap<&str, Mark> =
        deps.keys().map(|n| (n.as_str(), Mark::Unvisited)).collect();
    let mut order = Vec::with_capacity(deps.len());
    let mut stack = Vec::new();

    fn visit<'a>(
        name: &'a str,
        deps: &'a BTreeMap<String, BTreeSet<String>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<String>,
        order: &mut Vec<String>,
    ) -> Result<(), LoweringError> {
        match marks.get(name).copied() {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::InProgress) => {
                let mut cycle: Vec<String> = stack.clone();
                cycle.push(name.to_string());
                return Err(LoweringError::CircularDependency(cycle));
            },
            _ => {},
        }
        marks.insert(name, Mark::InProgress);
        stack.push(name.to_string());
        if let Some(children) = deps.get(name) {
            for child in children {
                if deps.contains_key(child.as_str()) {
                    visit(child, deps, marks, stack, order)?;
                }
            }
        }
        stack.pop();
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }

    for name in deps.keys() {
        visit(name, &deps, &mut marks, &mut stack, &mut order)?;
    }

    Ok(order)
}
